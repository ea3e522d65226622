use encoding_rs::Encoding;
use html5ever::serialize::{serialize, SerializeOpts};
use markup5ever_rcdom::{RcDom, SerializableHandle};

use crate::translation::error::{TranslationError, TranslationResult};

/// 序列化文档
///
/// `document_encoding` 为空或无法识别时输出 UTF-8。
pub fn serialize_document(dom: &RcDom, document_encoding: &str) -> TranslationResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();

    let serializable: SerializableHandle = dom.document.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .map_err(|e| TranslationError::SerializationError(format!("无法序列化DOM: {}", e)))?;

    if !document_encoding.is_empty() {
        if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            let s: &str = &String::from_utf8_lossy(&buf);
            let (data, _, _) = encoding.encode(s);
            buf = data.to_vec();
        }
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::html_to_dom;

    #[test]
    fn test_serialize_keeps_markup() {
        let dom = html_to_dom(b"<p>Hello <b>world</b></p>", "utf-8");
        let out = serialize_document(&dom, "utf-8").unwrap();
        let html = String::from_utf8(out).unwrap();
        assert!(html.contains("<p>Hello <b>world</b></p>"));
    }

    #[test]
    fn test_serialize_encodes_to_document_charset() {
        let dom = html_to_dom("<p>café</p>".as_bytes(), "utf-8");
        let out = serialize_document(&dom, "windows-1252").unwrap();
        assert!(out.contains(&0xE9));
    }
}
