use super::*;
use tempfile::TempDir;

const GROUPED: &str = r#"{
    "faq_data": [
        {
            "category": "shipping",
            "questions": [
                {"question": "How long does delivery take?", "answer": "3-5 business days."},
                {"question": "Do you ship abroad?", "answer": "Yes, to 30 countries."}
            ]
        },
        {
            "category": "refunds",
            "questions": [
                {"question": "How do refunds work?", "answer": "Refunds take 10 days."}
            ]
        }
    ]
}"#;

const KEYED: &str = r#"{
    "shipping": [
        {"question": "How long does delivery take?", "answer": "3-5 business days."},
        {"question": "Do you ship abroad?", "answer": "Yes, to 30 countries."}
    ],
    "refunds": [
        {"question": "How do refunds work?", "answer": "Refunds take 10 days."}
    ]
}"#;

fn expect_malformed(content: &str) -> String {
    match KnowledgeBase::from_json_str(content) {
        Err(FaqError::MalformedSource(message)) => message,
        other => panic!("expected MalformedSource, got {:?}", other),
    }
}

#[test]
fn grouped_layout_preserves_order() {
    let knowledge = KnowledgeBase::from_json_str(GROUPED).expect("valid document");
    let records = knowledge.records();

    assert_eq!(knowledge.layout(), SourceLayout::Grouped);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].question, "How long does delivery take?");
    assert_eq!(records[1].question, "Do you ship abroad?");
    assert_eq!(records[2].category, "refunds");
    assert_eq!(records[0].id, "shipping#0");
    assert_eq!(records[1].id, "shipping#1");
    assert_eq!(records[2].id, "refunds#0");
}

#[test]
fn keyed_layout_yields_same_records() {
    let grouped = KnowledgeBase::from_json_str(GROUPED).expect("valid grouped document");
    let keyed = KnowledgeBase::from_json_str(KEYED).expect("valid keyed document");

    assert_eq!(keyed.layout(), SourceLayout::Keyed);
    assert_eq!(grouped.records(), keyed.records());
}

#[test]
fn record_ids_are_unique() {
    let knowledge = KnowledgeBase::from_json_str(GROUPED).expect("valid document");
    let ids: HashSet<String> = knowledge.records().into_iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), knowledge.len());
}

#[test]
fn missing_grouping_keys_are_rejected() {
    let message = expect_malformed(r#"{"faq_data": [{"questions": []}]}"#);
    assert!(message.contains("'category'"), "{}", message);

    let message = expect_malformed(r#"{"faq_data": [{"category": "shipping"}]}"#);
    assert!(message.contains("'questions'"), "{}", message);

    let message = expect_malformed(r#"{"faq_data": {"category": "shipping"}}"#);
    assert!(message.contains("faq_data"), "{}", message);
}

#[test]
fn missing_pair_fields_are_rejected() {
    let message = expect_malformed(
        r#"{"faq_data": [{"category": "shipping", "questions": [{"question": "Where?"}]}]}"#,
    );
    assert!(message.contains("faq_data[0].questions[0]"), "{}", message);
    assert!(message.contains("'answer'"), "{}", message);

    let message = expect_malformed(r#"{"shipping": [{"answer": "Soon"}]}"#);
    assert!(message.contains("'question'"), "{}", message);
}

#[test]
fn empty_question_is_rejected() {
    let message = expect_malformed(r#"{"shipping": [{"question": "  ", "answer": "Soon"}]}"#);
    assert!(message.contains("cannot be empty"), "{}", message);
}

#[test]
fn non_object_documents_are_rejected() {
    expect_malformed("[1, 2, 3]");
    expect_malformed("not json");
    expect_malformed(r#"{"shipping": "fast"}"#);
}

#[test]
fn duplicate_categories_are_rejected() {
    let message = expect_malformed(
        r#"{"faq_data": [
            {"category": "shipping", "questions": []},
            {"category": "shipping", "questions": []}
        ]}"#,
    );
    assert!(message.contains("duplicate category"), "{}", message);
}

#[test]
fn empty_document_has_no_records() {
    let knowledge = KnowledgeBase::from_json_str(r#"{"faq_data": []}"#).expect("valid document");
    assert!(knowledge.is_empty());
    assert!(knowledge.records().is_empty());
}

#[test]
fn save_round_trips_through_disk() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("faq_data.json");

    for source in [GROUPED, KEYED] {
        let knowledge = KnowledgeBase::from_json_str(source).expect("valid document");
        knowledge.save(&path).expect("should save knowledge base");

        let content = fs::read_to_string(&path).expect("should read saved file");
        assert!(content.contains("\n    "), "expected four-space indentation");

        let reloaded = KnowledgeBase::load(&path).expect("should reload knowledge base");
        assert_eq!(reloaded, knowledge);
    }
}

#[test]
fn load_missing_file_is_malformed_source() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = KnowledgeBase::load(temp_dir.path().join("missing.json"));
    assert!(matches!(result, Err(FaqError::MalformedSource(_))));
}

#[test]
fn unknown_keys_survive_save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("faq_data.json");

    let source = r#"{
        "version": 3,
        "faq_data": [
            {
                "category": "shipping",
                "icon": "truck",
                "questions": [
                    {"question": "How long?", "answer": "3-5 days.", "tags": ["x"]}
                ]
            }
        ]
    }"#;
    let knowledge = KnowledgeBase::from_json_str(source).expect("valid document");
    assert_eq!(knowledge.categories()[0].extra["icon"], "truck");
    assert_eq!(knowledge.categories()[0].questions[0].extra["tags"][0], "x");

    knowledge.save(&path).expect("should save knowledge base");
    let reloaded = KnowledgeBase::load(&path).expect("should reload knowledge base");
    assert_eq!(reloaded, knowledge);
    assert_eq!(reloaded.to_value()["version"], 3);

    let keyed = KnowledgeBase::from_json_str(
        r#"{"shipping": [{"question": "How long?", "answer": "3-5 days.", "source": "wiki"}]}"#,
    )
    .expect("valid keyed document");
    assert_eq!(keyed.to_value()["shipping"][0]["source"], "wiki");
}

#[test]
fn save_replaces_file_without_leftovers() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("faq_data.json");
    fs::write(&path, "stale contents").expect("should write stale file");

    let knowledge = KnowledgeBase::from_json_str(GROUPED).expect("valid document");
    knowledge.save(&path).expect("should save knowledge base");

    let entries: Vec<_> = fs::read_dir(temp_dir.path())
        .expect("should list temp dir")
        .collect();
    assert_eq!(entries.len(), 1, "only the knowledge file remains");
    assert_eq!(
        KnowledgeBase::load(&path).expect("should reload knowledge base"),
        knowledge
    );
}
