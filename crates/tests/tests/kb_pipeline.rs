use std::path::PathBuf;
use std::sync::Arc;

use cardassist_retrieval::{HashedTokenEmbedder, KnowledgeIndex, PassageRetriever, Retriever};

fn kb_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../kb")
}

fn load() -> KnowledgeIndex {
    KnowledgeIndex::from_kb_dir(kb_root(), Some(Arc::new(HashedTokenEmbedder::default())))
        .expect("fixture knowledge base should load")
}

#[test]
fn guide_is_split_along_its_table_of_contents() {
    let index = load();
    let sections = index
        .list_docs()
        .iter()
        .filter(|doc| doc.start_page.is_some())
        .map(|doc| (doc.title.as_str(), doc.start_page, doc.end_page))
        .collect::<Vec<_>>();

    assert_eq!(
        sections,
        vec![
            ("Getting Started", Some(3), Some(3)),
            ("Activating Your Card", Some(4), Some(4)),
            ("PIN Management", Some(5), Some(5)),
            ("Lost or Stolen Cards", Some(6), Some(6)),
            ("Fees and Charges", Some(7), Some(7)),
            ("Using Your Card Abroad", Some(8), Some(8)),
            ("Contact Us", Some(9), Some(9)),
        ]
    );
}

#[test]
fn running_footer_is_not_indexed() {
    let index = load();
    assert!(index
        .list_docs()
        .iter()
        .all(|doc| !doc.body.contains("User Guide | Page")));
}

#[test]
fn markdown_faq_is_titled_by_heading() {
    let index = load();
    assert!(index
        .list_docs()
        .iter()
        .any(|doc| doc.title == "Card Assistant FAQ" && doc.start_page.is_none()));
}

#[test]
fn passages_carry_section_titles() {
    let retriever = PassageRetriever::new(Arc::new(load()), 3);

    let passages = retriever.search("change my PIN at an ATM");

    assert!(passages.starts_with("PIN Management  "));
    assert!(retriever.search("zzqx wyvern").is_empty());
}
