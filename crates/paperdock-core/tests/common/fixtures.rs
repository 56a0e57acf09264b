//! Shared builders for integration tests: raw provider records and
//! synthetic PDFs.

use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use paperdock_core::RawPaperMetadata;

/// Raw metadata as an arXiv-like provider would report it.
pub fn arxiv_record(title: &str, arxiv_id: &str) -> RawPaperMetadata {
    RawPaperMetadata {
        provider_id: arxiv_id.to_string(),
        title: title.to_string(),
        authors: vec!["Jane Doe".to_string(), "John Roe".to_string()],
        abstract_text: Some(format!("We study {}.", title.to_lowercase())),
        arxiv_id: Some(arxiv_id.to_string()),
        url: Some(format!("https://arxiv.org/abs/{}", arxiv_id)),
        keywords: vec!["test".to_string()],
        ..Default::default()
    }
}

/// Raw metadata as a Semantic-Scholar-like provider would report it.
pub fn s2_record(title: &str, s2_id: &str) -> RawPaperMetadata {
    RawPaperMetadata {
        provider_id: s2_id.to_string(),
        title: title.to_string(),
        authors: vec!["Jane Doe".to_string()],
        abstract_text: Some(format!("Abstract for {}.", title)),
        url: Some(format!("https://www.semanticscholar.org/paper/{}", s2_id)),
        ..Default::default()
    }
}

pub fn dated(mut raw: RawPaperMetadata, date: (i32, u32, u32)) -> RawPaperMetadata {
    raw.published_date = NaiveDate::from_ymd_opt(date.0, date.1, date.2);
    raw
}

pub fn cited(mut raw: RawPaperMetadata, citations: i64) -> RawPaperMetadata {
    raw.citation_count = Some(citations);
    raw
}

/// Build a valid PDF with one page per entry, each showing its lines.
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 750.into()]),
        ];
        for line in *lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("Td", vec![0.into(), (-14).into()]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content stream"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("serialize pdf");
    buffer
}

/// Single-page PDF showing the given lines.
pub fn text_pdf(lines: &[&str]) -> Vec<u8> {
    pdf_with_pages(&[lines])
}
