use std::fs;
use tempfile::TempDir;

use hybridrag_core::chunker::{chunk, chunk_document, chunk_spans, CharChunker};
use hybridrag_core::document::{
    load_documents, parse_json_records, payload_text, record_to_document, TextSource, MAX_FIELD_CHARS,
};
use hybridrag_core::types::{Document, Fields, Payload};
use hybridrag_core::Error;

#[test]
fn chunk_1200_chars_by_500_with_50_overlap() {
    let text: String = "abcdefghij".repeat(120);
    let spans = chunk_spans(&text, Some(500), 50).expect("chunk");
    let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![0, 450, 900]);
    assert_eq!(spans[2].text.chars().count(), 300);
    assert_eq!(spans[2].end, 1200);
}

#[test]
fn chunks_cover_every_offset_without_gaps() {
    let text = "The quick brown fox jumps over the lazy dog. 수출입 통관 절차.".repeat(7);
    let n = text.chars().count();
    for (size, overlap) in [(1, 0), (7, 3), (50, 49), (64, 0), (1000, 10)] {
        let spans = chunk_spans(&text, Some(size), overlap).expect("chunk");
        let mut covered = vec![false; n];
        for s in &spans {
            assert_eq!(s.end - s.start, s.text.chars().count());
            covered[s.start..s.end].iter_mut().for_each(|c| *c = true);
        }
        assert!(covered.iter().all(|c| *c), "gap for size={size} overlap={overlap}");
        for pair in spans.windows(2) {
            assert!(pair[0].start < pair[1].start, "spans walk forward");
            if overlap > 0 {
                assert!(pair[1].start < pair[0].end, "consecutive spans overlap");
            }
        }
    }
}

#[test]
fn chunking_is_deterministic() {
    let text = "deterministic chunk boundaries ".repeat(40);
    let a = chunk(&text, Some(37), 5).expect("first");
    let b = chunk(&text, Some(37), 5).expect("second");
    assert_eq!(a, b);
}

#[test]
fn invalid_overlap_fails_before_any_work() {
    assert!(matches!(chunk("text", Some(3), 3), Err(Error::Configuration(_))));
    assert!(matches!(CharChunker::new(Some(2), 5), Err(Error::Configuration(_))));
}

#[test]
fn chunk_document_numbers_chunks() {
    let doc = Document { id: "d1".into(), fields: Fields::new(), body: "x".repeat(25) };
    let chunker = CharChunker::new(Some(10), 0).expect("chunker");
    let chunks = chunk_document(&doc, &chunker).expect("chunks");
    assert_eq!(chunks.len(), 3);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.doc_id, "d1");
        assert_eq!(c.index, i);
        assert_eq!(c.total, 3);
    }
    assert_eq!(chunks[2].text.len(), 5);
}

#[test]
fn text_source_resolution_order() {
    let records = parse_json_records(
        r#"{"id": "c1", "auto_summary": "", "text": "full text", "cert_subject": "subject"}
{"id": "c2", "cert_subject": "only subject", "country": "KR", "year": 2024, "note": null}"#,
    )
    .expect("parse");

    let auto = record_to_document(&records[0], &TextSource::Auto, 1).expect("ok").expect("doc");
    assert_eq!(auto.body, "full text", "empty summary falls through");
    let full = record_to_document(&records[0], &TextSource::Full, 1).expect("ok").expect("doc");
    assert_eq!(full.body, "subject");
    assert!(record_to_document(&records[1], &TextSource::Summary, 2).expect("ok").is_none());

    let second = record_to_document(&records[1], &TextSource::Auto, 2).expect("ok").expect("doc");
    assert_eq!(second.fields.get("country").map(String::as_str), Some("KR"));
    assert_eq!(second.fields.get("year").map(String::as_str), Some("2024"));
    assert!(!second.fields.contains_key("note"));
    assert!(!second.fields.contains_key("id"));
}

#[test]
fn body_field_is_not_repeated_in_fields() {
    let body = "가".repeat(4500);
    let note = "n".repeat(3000);
    let record = serde_json::json!({"id": "d1", "country": "KR", "text": body, "cert_subject": note});
    let record = record.as_object().expect("object");

    let doc = record_to_document(record, &TextSource::Auto, 1).expect("ok").expect("doc");
    assert_eq!(doc.body.chars().count(), 4500);
    assert!(!doc.fields.contains_key("text"));
    assert_eq!(doc.fields.get("country").map(String::as_str), Some("KR"));
    assert_eq!(doc.fields.get("cert_subject").map(|s| s.chars().count()), Some(MAX_FIELD_CHARS));

    let field_bytes: usize = doc.fields.iter().map(|(k, v)| k.len() + v.len()).sum();
    assert!(field_bytes < 1100, "fields hold {field_bytes} bytes");
}

#[test]
fn custom_field_list() {
    let records = parse_json_records(r#"[{"id": 3, "title": "T", "content": "C"}]"#).expect("parse");
    let src = TextSource::Fields(vec!["title".into(), "content".into()]);
    let doc = record_to_document(&records[0], &src, 1).expect("ok").expect("doc");
    assert_eq!(doc.id, "3");
    assert_eq!(doc.body, "T");
}

#[test]
fn load_documents_skips_textless_records_and_rejects_missing_ids() {
    let tmp = TempDir::new().expect("tmp");
    let good = tmp.path().join("docs.jsonl");
    fs::write(&good, "{\"id\":\"a\",\"text\":\"alpha\"}\n\n{\"id\":\"b\",\"url\":\"x\"}\n").expect("write");
    let docs = load_documents(&good, &TextSource::Auto).expect("load");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "a");

    let bad = tmp.path().join("bad.jsonl");
    fs::write(&bad, "{\"id\":\"a\",\"text\":\"alpha\"}\n{\"text\":\"no id\"}\n").expect("write");
    match load_documents(&bad, &TextSource::Auto) {
        Err(Error::InvalidRecord { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected InvalidRecord, got {other:?}"),
    }
}

#[test]
fn malformed_line_reports_its_number() {
    match parse_json_records("{\"id\":1}\n{oops\n") {
        Err(Error::InvalidRecord { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected InvalidRecord, got {other:?}"),
    }
}

#[test]
fn payload_text_falls_back_to_content_field() {
    let mut fields = Fields::new();
    fields.insert("content".into(), "from content".into());
    let p = Payload { fields, ..Payload::default() };
    assert_eq!(payload_text(&p), Some("from content"));
}
