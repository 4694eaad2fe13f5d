use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use hoc_card::client::{ApiError, HocApi, SubmissionDispatcher, SubmissionError, UploadError};
use hoc_card::form::{
    Evidence, EvidenceFile, Field, FormStore, SubmissionStatus, TagGroup, MAX_EVIDENCE_BYTES, TAG_NONE, TAG_OTHERS,
};
use hoc_card::payload::SubmissionPayload;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
}

#[derive(Default)]
struct Calls {
    tokens: Vec<String>,
    puts: Vec<(String, String, usize)>,
    posts: Vec<SubmissionPayload>,
}

/// Scripted backend: post replies are popped in order, success once empty
struct MockApi {
    calls: Arc<Mutex<Calls>>,
    post_replies: Mutex<VecDeque<Result<String, ApiError>>>,
    token_status: Option<ApiError>,
    put_fails: bool,
}

impl MockApi {
    fn new(post_replies: Vec<Result<String, ApiError>>) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Calls::default())),
            post_replies: Mutex::new(VecDeque::from(post_replies)),
            token_status: None,
            put_fails: false,
        }
    }
}

#[async_trait]
impl HocApi for MockApi {
    async fn request_upload_token(&self, pathname: &str) -> Result<String, ApiError> {
        self.calls.lock().await.tokens.push(pathname.to_string());
        match &self.token_status {
            Some(err) => Err(err.clone()),
            None => Ok("hoc_blob_client_test".to_string()),
        }
    }

    async fn put_blob(&self, token: &str, pathname: &str, content_type: &str, data: Vec<u8>)
        -> Result<String, ApiError> {
        assert_eq!(token, "hoc_blob_client_test");
        self.calls
            .lock()
            .await
            .puts
            .push((pathname.to_string(), content_type.to_string(), data.len()));
        if self.put_fails {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        Ok(format!("https://blob.example/{}", pathname))
    }

    async fn post_submission(&self, payload: &SubmissionPayload) -> Result<String, ApiError> {
        self.calls.lock().await.posts.push(payload.clone());
        self.post_replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("email-1".to_string()))
    }
}

fn filled_store() -> FormStore {
    let mut store = FormStore::new();
    store.update(Field::Unsafe, "act");
    store.update(Field::Location, "Jetty 2");
    store.update(Field::ObserverName, "Ada");
    store.update(Field::Company, "Acme Offshore");
    store.update(Field::Position, "HSE Officer");
    store.update(Field::Date, "2024-06-14");
    store.update(Field::Time, "09:30");
    store.update(Field::IncidentDetails, "Worker on ladder without harness");
    store.update(Field::CorrectiveActions, "Stopped task and issued harness");
    store.toggle_tag(TagGroup::LifeSavingRules, "Working at Height");
    store.toggle_tag(TagGroup::CausalFactors, TAG_NONE);
    store.update(Field::StopWorkEnforced, "no");
    store
}

fn png(bytes: usize) -> EvidenceFile {
    EvidenceFile::new("ladder.png", "image/png", vec![7; bytes])
}

#[tokio::test]
async fn test_walks_steps_and_submits_without_evidence() {
    let api = Arc::new(MockApi::new(vec![]));
    let dispatcher = SubmissionDispatcher::new(api.clone());
    let mut store = filled_store();

    for expected in 2..=4 {
        assert!(store.next_on(today()));
        assert_eq!(store.state().current_step, expected);
    }
    assert!(store.next_on(today()));
    assert_eq!(store.state().current_step, 4);

    let id = dispatcher.submit_on(&mut store, today()).await.unwrap();
    assert_eq!(id, "email-1");
    assert_eq!(store.state().status, SubmissionStatus::Done);
    assert_eq!(store.state().confirmation_id.as_deref(), Some("email-1"));

    let calls = api.calls.lock().await;
    assert!(calls.tokens.is_empty());
    assert!(calls.puts.is_empty());
    assert_eq!(calls.posts.len(), 1);
    assert_eq!(calls.posts[0].observer_name, "Ada");
    assert_eq!(calls.posts[0].causal_factors, vec![TAG_NONE.to_string()]);
    assert!(calls.posts[0].file_url.is_none());
}

#[tokio::test]
async fn test_others_without_elaboration_blocks_step_three() {
    let mut store = filled_store();
    store.toggle_tag(TagGroup::CausalFactors, TAG_NONE);
    store.toggle_tag(TagGroup::CausalFactors, TAG_OTHERS);
    store.set_step(3);

    assert!(!store.next_on(today()));
    assert_eq!(store.state().current_step, 3);
    assert_eq!(
        store.state().errors.get(Field::OtherCausalFactors),
        Some("Please specify other causal factors.")
    );

    store.update(Field::OtherCausalFactors, "Slippery rungs");
    assert!(store.next_on(today()));
    assert_eq!(store.state().current_step, 4);
}

#[tokio::test]
async fn test_invalid_card_never_reaches_network() {
    let api = Arc::new(MockApi::new(vec![]));
    let dispatcher = SubmissionDispatcher::new(api.clone());
    let mut store = filled_store();
    store.update(Field::Date, "2024-06-15");
    store.set_step(4);

    let err = dispatcher.submit_on(&mut store, today()).await.unwrap_err();
    match err {
        SubmissionError::Validation(errors) => {
            assert_eq!(errors.get(Field::Date), Some("Date cannot be in the future."));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    // Sent back to the first step with an error
    assert_eq!(store.state().current_step, 1);
    assert_eq!(store.state().status, SubmissionStatus::Idle);

    let calls = api.calls.lock().await;
    assert!(calls.posts.is_empty());
    assert!(calls.tokens.is_empty());
}

#[tokio::test]
async fn test_oversized_evidence_fails_before_upload() {
    let api = Arc::new(MockApi::new(vec![]));
    let dispatcher = SubmissionDispatcher::new(api.clone());
    let mut store = filled_store();
    store.attach_evidence(png(MAX_EVIDENCE_BYTES as usize + 1));

    let err = dispatcher.submit_on(&mut store, today()).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Validation(ref e) if e.contains(Field::Evidence)));
    assert_eq!(store.state().current_step, 4);

    let calls = api.calls.lock().await;
    assert!(calls.tokens.is_empty());
    assert!(calls.posts.is_empty());
}

#[tokio::test]
async fn test_evidence_is_uploaded_then_referenced() {
    let api = Arc::new(MockApi::new(vec![]));
    let dispatcher = SubmissionDispatcher::new(api.clone());
    let mut store = filled_store();
    store.attach_evidence(png(2048));

    dispatcher.submit_on(&mut store, today()).await.unwrap();

    let calls = api.calls.lock().await;
    assert_eq!(calls.tokens, vec!["evidence/ladder.png".to_string()]);
    assert_eq!(
        calls.puts,
        vec![("evidence/ladder.png".to_string(), "image/png".to_string(), 2048)]
    );
    assert_eq!(
        calls.posts[0].file_url.as_deref(),
        Some("https://blob.example/evidence/ladder.png")
    );
}

#[tokio::test]
async fn test_retry_after_rejection_reuses_uploaded_evidence() {
    let api = Arc::new(MockApi::new(vec![Err(ApiError::Status {
        status: 400,
        message: "Email provider rejected the message: Invalid `to` field".to_string(),
    })]));
    let dispatcher = SubmissionDispatcher::new(api.clone());
    let mut store = filled_store();
    store.attach_evidence(png(100));

    let err = dispatcher.submit_on(&mut store, today()).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Rejected { status: 400, .. }));
    assert_eq!(store.state().status, SubmissionStatus::Failed);
    assert!(store.state().last_error.as_deref().unwrap().contains("Invalid `to` field"));
    assert!(matches!(store.record().evidence, Some(Evidence::Uploaded { .. })));

    // Still editable after a failure
    store.update(Field::Location, "Jetty 3");
    assert_eq!(store.record().location, "Jetty 3");

    let id = dispatcher.submit_on(&mut store, today()).await.unwrap();
    assert_eq!(id, "email-1");

    let calls = api.calls.lock().await;
    assert_eq!(calls.puts.len(), 1);
    assert_eq!(calls.posts.len(), 2);
    assert_eq!(calls.posts[1].location, "Jetty 3");
    assert_eq!(calls.posts[0].file_url, calls.posts[1].file_url);
}

#[tokio::test]
async fn test_failed_transfer_leaves_card_unsent() {
    let mut mock = MockApi::new(vec![]);
    mock.put_fails = true;
    let api = Arc::new(mock);
    let dispatcher = SubmissionDispatcher::new(api.clone());
    let mut store = filled_store();
    store.attach_evidence(png(100));

    let err = dispatcher.submit_on(&mut store, today()).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Upload(UploadError::Network(_))));
    assert_eq!(store.state().status, SubmissionStatus::Failed);
    assert!(matches!(store.record().evidence, Some(Evidence::Local(_))));
    assert!(api.calls.lock().await.posts.is_empty());
}

#[tokio::test]
async fn test_refused_upload_token_leaves_card_unsent() {
    let mut mock = MockApi::new(vec![]);
    mock.token_status = Some(ApiError::Status {
        status: 500,
        message: "Server configuration error: HOC_BLOB_READ_WRITE_TOKEN is not set".to_string(),
    });
    let api = Arc::new(mock);
    let dispatcher = SubmissionDispatcher::new(api.clone());
    let mut store = filled_store();
    store.attach_evidence(png(100));

    let err = dispatcher.submit_on(&mut store, today()).await.unwrap_err();
    match err {
        SubmissionError::Upload(UploadError::Rejected(message)) => {
            assert!(message.contains("HOC_BLOB_READ_WRITE_TOKEN"));
        }
        other => panic!("expected a rejected upload, got {:?}", other),
    }
    assert_eq!(store.state().status, SubmissionStatus::Failed);
    assert!(matches!(store.record().evidence, Some(Evidence::Local(_))));

    let calls = api.calls.lock().await;
    assert_eq!(calls.tokens.len(), 1);
    assert!(calls.puts.is_empty());
    assert!(calls.posts.is_empty());
}

#[tokio::test]
async fn test_submitted_card_is_closed() {
    let api = Arc::new(MockApi::new(vec![]));
    let dispatcher = SubmissionDispatcher::new(api.clone());
    let mut store = filled_store();

    dispatcher.submit_on(&mut store, today()).await.unwrap();
    store.update(Field::Location, "Elsewhere");
    assert_eq!(store.record().location, "Jetty 2");

    let again = dispatcher.submit_on(&mut store, today()).await;
    assert_eq!(again, Err(SubmissionError::AlreadySubmitted));
    assert_eq!(api.calls.lock().await.posts.len(), 1);
}
