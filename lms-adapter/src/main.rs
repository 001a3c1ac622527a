use anyhow::{bail, Context, Result};
use lms_adapter::{AdapterContext, AdapterRegistry, LmsApi, QuizQuery, StaticConfigRepository};
use lms_gateway::config::{load_config, GatewayConfig};
use lms_gateway::credentials::{
    AesGcmVault, CredentialVault, MemoryTokenStore, SqliteTokenStore, TokenStore,
};
use lms_gateway::LmsConfig;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// `[[lms_setup]]` entries of the setups file
#[derive(Debug, Deserialize)]
struct SetupsFile {
    #[serde(default)]
    lms_setup: Vec<LmsConfig>,
}

const FIRST_PAGE_SIZE: u32 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lms_adapter=info,lms_gateway=info".into()),
        )
        .init();

    let encryption_key = std::env::var("LMS_ENCRYPTION_KEY")
        .context("LMS_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;
    let vault = Arc::new(
        AesGcmVault::from_base64_key(&encryption_key).context("Invalid LMS_ENCRYPTION_KEY")?,
    );

    // `lms-probe encrypt <secret>` prints the ciphertext for a setups file
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("encrypt") => {
            let Some(plaintext) = args.get(1) else {
                bail!("usage: lms-probe encrypt <client-secret>");
            };
            println!("{}", vault.encrypt(plaintext)?);
            return Ok(());
        }
        Some(other) => bail!("unknown command: {}", other),
        None => {}
    }

    let config = match std::env::var("LMS_GATEWAY_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => GatewayConfig::default(),
    }
    .with_env_overrides();

    let setups_path = std::env::var("LMS_SETUPS_FILE").unwrap_or_else(|_| "lms-setups.toml".to_string());
    let contents = std::fs::read_to_string(&setups_path)
        .with_context(|| format!("Failed to read setups file {}", setups_path))?;
    let setups: SetupsFile = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse setups file {}", setups_path))?;

    let token_store: Arc<dyn TokenStore> = match &config.token_store.path {
        Some(path) => Arc::new(
            SqliteTokenStore::new(path).context("Failed to initialize token store")?,
        ),
        None => Arc::new(MemoryTokenStore::new()),
    };

    info!(
        setups = setups.lms_setup.len(),
        token_store = config.token_store.path.as_deref().unwrap_or("memory"),
        timeout_secs = config.http.timeout_secs,
        "Configuration loaded"
    );

    let context = AdapterContext::new(&config, vault, token_store)?;
    let registry = AdapterRegistry::new(
        context,
        Arc::new(StaticConfigRepository::new(setups.lms_setup.clone())),
    );

    let mut failed = 0;
    for setup in setups.lms_setup.iter().filter(|s| s.active) {
        let adapter = registry.resolve(setup);

        let mut result = adapter.test_connection().await;
        if result.is_ok() {
            match adapter.fetch_quizzes(&QuizQuery::page(0, FIRST_PAGE_SIZE)).await {
                Ok(page) => {
                    info!(
                        lms_setup = setup.id,
                        number_of_pages = page.number_of_pages(),
                        quizzes = page.page_size(),
                        "Fetched first quiz page"
                    );
                    for quiz in page.content() {
                        println!("{}\t{}\t{}\t{}", setup.id, quiz.id(), quiz.name(), quiz.start_url());
                    }
                }
                Err(e) => {
                    warn!(lms_setup = setup.id, error = %e, "Quiz listing failed");
                    result = result.attach_listing_error(&e);
                }
            }
        }

        if !result.is_ok() {
            failed += 1;
            error!(lms_setup = setup.id, name = %setup.name, "LMS setup check failed");
        }
        println!("{}", serde_json::to_string(&result)?);
    }

    if failed > 0 {
        bail!("{} LMS setup(s) failed the check", failed);
    }
    Ok(())
}
