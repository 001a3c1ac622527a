//! End-to-end behavior of the adapter layer through the public API.

use lms_adapter::{
    AdapterContext, AdapterRegistry, ErrorType, LmsApi, LmsError, QuizQuery,
    StaticConfigRepository,
};
use lms_gateway::config::GatewayConfig;
use lms_gateway::credentials::{
    AesGcmVault, CredentialVault, MemoryTokenStore, SqliteTokenStore, TokenStore,
};
use lms_gateway::{LmsConfig, LmsSetupAttribute, LmsType};
use mockito::Matcher;
use std::sync::Arc;

fn vault() -> Arc<AesGcmVault> {
    Arc::new(AesGcmVault::new([9u8; 32]))
}

fn edx_setup(id: i64, url: &str, client_name: &str, secret_ciphertext: String) -> LmsConfig {
    LmsConfig {
        id,
        institution_id: 1,
        name: "Open edX".to_string(),
        lms_type: LmsType::OpenEdx,
        api_url: url.to_string(),
        client_name: client_name.to_string(),
        client_secret: secret_ciphertext,
        active: true,
    }
}

fn registry_with(
    config: GatewayConfig,
    vault: Arc<AesGcmVault>,
    store: Arc<dyn TokenStore>,
    setups: Vec<LmsConfig>,
) -> AdapterRegistry {
    let context = AdapterContext::new(&config, vault, store).unwrap();
    AdapterRegistry::new(context, Arc::new(StaticConfigRepository::new(setups)))
}

#[tokio::test]
async fn test_empty_url_reports_missing_url_without_network() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let vault = vault();
    let setup = edx_setup(1, "", "x", vault.encrypt("y").unwrap());
    let registry = registry_with(
        GatewayConfig::default(),
        vault,
        Arc::new(MemoryTokenStore::new()),
        vec![setup],
    );

    let result = registry.resolve_by_id(1).unwrap().test_connection().await;
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].error_type, ErrorType::MissingAttribute);
    assert_eq!(result.missing_attributes(), &[LmsSetupAttribute::ApiUrl]);
    assert!(!result.is_quiz_access_ok());
    token.assert_async().await;
}

#[tokio::test]
async fn test_all_token_paths_404_reports_one_token_error() {
    let mut server = mockito::Server::new_async().await;
    let default_path = server
        .mock("POST", "/oauth2/access_token")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;
    let alternative_path = server
        .mock("POST", "/edx/oauth2/token")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let mut config = GatewayConfig::default();
    config.open_edx.alternative_token_paths = vec!["/edx/oauth2/token".to_string()];

    let vault = vault();
    let setup = edx_setup(2, &server.url(), "client", vault.encrypt("secret").unwrap());
    let registry = registry_with(config, vault, Arc::new(MemoryTokenStore::new()), vec![]);

    let result = registry.resolve(&setup).test_connection().await;
    assert_eq!(result.errors().len(), 1);
    let error = &result.errors()[0];
    assert_eq!(error.error_type, ErrorType::TokenRequest);
    assert!(error.message.contains("/oauth2/access_token"));
    assert!(error.message.contains("/edx/oauth2/token"));
    assert!(result.missing_attributes().is_empty());

    default_path.assert_async().await;
    alternative_path.assert_async().await;
}

#[tokio::test]
async fn test_single_course_page_maps_to_canonical_page() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth2/access_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "t", "expires_in": 3600}"#)
        .create_async()
        .await;
    let _courses = server
        .mock("GET", "/api/courses/v1/courses/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "1".into()),
            Matcher::UrlEncoded("page_size".into(), "25".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"num_pages": 1, "results": [{"id": "c1", "name": "Course"}]}"#)
        .create_async()
        .await;

    let vault = vault();
    let setup = edx_setup(3, &server.url(), "client", vault.encrypt("secret").unwrap());
    let registry = registry_with(
        GatewayConfig::default(),
        vault,
        Arc::new(MemoryTokenStore::new()),
        vec![],
    );

    let page = registry
        .resolve(&setup)
        .fetch_quizzes(&QuizQuery::page(0, 25))
        .await
        .unwrap();
    assert_eq!(page.number_of_pages(), 1);
    assert_eq!(page.page_number(), 0);
    assert_eq!(page.page_size(), 1);
    assert_eq!(page.content().len(), 1);

    let quiz = &page.content()[0];
    assert_eq!(quiz.id(), "c1");
    assert_eq!(quiz.name(), "Course");
    assert!(quiz.description().is_none());
    assert!(quiz.start_time().is_none());
    assert!(quiz.end_time().is_none());

    let json = serde_json::to_value(&page).unwrap();
    assert_eq!(json["page_size"], 1);
    assert!(json["content"][0]["description"].is_null());
}

#[tokio::test]
async fn test_type_mismatch_short_circuits_before_token_logic() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let vault = vault();
    let setup = edx_setup(4, &server.url(), "client", vault.encrypt("secret").unwrap());
    let registry = registry_with(
        GatewayConfig::default(),
        vault.clone(),
        Arc::new(MemoryTokenStore::new()),
        vec![],
    );
    let context = AdapterContext::new(&GatewayConfig::default(), vault, Arc::new(MemoryTokenStore::new())).unwrap();

    // A Moodle adapter asked to test an Open edX setup
    let moodle = lms_adapter::adapters::moodle::MoodleAdapter::new(Arc::new(setup.clone()), &context);
    let result = moodle.test_connection().await;
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.missing_attributes(), &[LmsSetupAttribute::LmsType]);

    // The registry always picks the matching adapter
    assert_eq!(registry.resolve(&setup).lms_type(), LmsType::OpenEdx);
    token.assert_async().await;
}

#[tokio::test]
async fn test_token_survives_restart_through_sqlite_store() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/oauth2/access_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "persisted", "expires_in": 3600}"#)
        .expect(1)
        .create_async()
        .await;
    let courses = server
        .mock("GET", "/api/courses/v1/courses/")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer persisted")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"num_pages": 1, "results": []}"#)
        .expect(2)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tokens.db");
    let vault = vault();
    let setup = edx_setup(5, &server.url(), "client", vault.encrypt("secret").unwrap());

    for _ in 0..2 {
        // Fresh registry and store on every iteration, as after a restart
        let store: Arc<dyn TokenStore> = Arc::new(SqliteTokenStore::new(&db_path).unwrap());
        let registry = registry_with(GatewayConfig::default(), vault.clone(), store, vec![]);
        let page = registry
            .resolve(&setup)
            .fetch_quizzes(&QuizQuery::page(0, 10))
            .await
            .unwrap();
        assert_eq!(page.page_size(), 0);
        assert_eq!(page.number_of_pages(), 1);
    }

    token.assert_async().await;
    courses.assert_async().await;
}

#[tokio::test]
async fn test_connection_result_with_retroactive_listing_error() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth2/access_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "t"}"#)
        .create_async()
        .await;
    let _courses = server
        .mock("GET", "/api/courses/v1/courses/")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;

    let vault = vault();
    let setup = edx_setup(6, &server.url(), "client", vault.encrypt("secret").unwrap());
    let registry = registry_with(
        GatewayConfig::default(),
        vault,
        Arc::new(MemoryTokenStore::new()),
        vec![setup],
    );
    let adapter = registry.resolve_by_id(6).unwrap();

    let result = adapter.test_connection().await;
    assert!(result.is_ok());

    let err = adapter.fetch_quizzes(&QuizQuery::page(0, 10)).await.unwrap_err();
    assert!(matches!(err, LmsError::QuizRestriction(_)));

    let result = result.attach_listing_error(&err);
    assert!(!result.is_ok());
    assert!(result.is_quiz_access_ok());
    assert!(result.has_error(ErrorType::QuizRestrictionApiRequest));
}
