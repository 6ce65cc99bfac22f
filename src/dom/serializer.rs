use encoding_rs::Encoding;
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, RcDom, SerializableHandle};

use crate::error::{BaitblockError, BaitblockResult};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> BaitblockResult<RcDom> {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .map_err(|e| BaitblockError::ParseError(format!("HTML解析失败: {}", e)))
}

/// 序列化文档，并按 `document_encoding` 重新编码
pub fn serialize_document(document: &Handle, document_encoding: &str) -> BaitblockResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();

    let serializable: SerializableHandle = document.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .map_err(|e| BaitblockError::SerializationError(format!("DOM序列化失败: {}", e)))?;

    if !document_encoding.is_empty() {
        if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            if encoding != encoding_rs::UTF_8 {
                let s: &str = &String::from_utf8_lossy(&buf);
                let (data, _, _) = encoding.encode(s);
                buf = data.to_vec();
            }
        }
    }

    Ok(buf)
}
