// This is the entry point of the WhatsApp assistant.
//
// **Architecture Overview:**
// - `core/` = Business logic (transport-agnostic tool-calling orchestrator)
// - `infra/` = Implementations of core traits (Gemini, Google, Linear, stores)
// - `whatsapp/` = WhatsApp-specific adapters (webhook, routing, sender)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Register the tools whose credentials are present
// 4. Serve the webhook

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "whatsapp/whatsapp_layer.rs"]
mod whatsapp;

mod config;

use crate::config::{BotConfig, GoogleCredentials};
use crate::core::ai::{AiService, ToolRegistry};
use crate::infra::ai::GeminiClient;
use crate::infra::conversation::InMemoryConversationStore;
use crate::infra::google::{
    register_google_tools, AccessTokenSource, DocsClient, DriveClient, GoogleApi,
    RefreshTokenAuth, ServiceAccountAuth,
};
use crate::infra::linear::{register_linear_tools, LinearClient};
use crate::whatsapp::{
    serve, webhook_router, MessageRouter, SenderAccess, SenderQueues, WebhookState,
    WhatsAppCloudClient,
};
use anyhow::Context;
use std::sync::Arc;

async fn google_auth(credentials: &GoogleCredentials) -> anyhow::Result<Arc<dyn AccessTokenSource>> {
    let auth: Arc<dyn AccessTokenSource> = match credentials {
        GoogleCredentials::RefreshToken {
            client_id,
            client_secret,
            refresh_token,
        } => Arc::new(RefreshTokenAuth::new(
            client_id.clone(),
            client_secret.clone(),
            refresh_token.clone(),
        )),
        GoogleCredentials::ServiceAccountFile(path) => Arc::new(
            ServiceAccountAuth::from_file(path)
                .await
                .with_context(|| format!("Failed to load service account key from {}", path))?,
        ),
        GoogleCredentials::ServiceAccountJson(json) => Arc::new(
            ServiceAccountAuth::from_json(json)
                .context("Failed to parse GOOGLE_SERVICE_ACCOUNT_JSON")?,
        ),
    };
    Ok(auth)
}

async fn build_tools(config: &BotConfig) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    match &config.google {
        Some(credentials) => {
            let api = Arc::new(GoogleApi::new(google_auth(credentials).await?));
            let drive = Arc::new(DriveClient::new(Arc::clone(&api)));
            let docs = Arc::new(DocsClient::new(api));
            register_google_tools(&mut registry, drive, docs)
                .context("Failed to register Google tools")?;
            tracing::info!("Google Drive and Docs tools enabled");
        }
        None => tracing::warn!(
            "No Google credentials configured; Drive and Docs tools are disabled"
        ),
    }

    match &config.linear_api_key {
        Some(key) => {
            let linear = Arc::new(LinearClient::new(key.clone()));
            register_linear_tools(&mut registry, linear)
                .context("Failed to register Linear tools")?;
            tracing::info!("Linear tools enabled");
        }
        None => tracing::warn!("LINEAR_API_KEY not set; Linear tools are disabled"),
    }

    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let ai_service = Arc::new(AiService::new(
        GeminiClient::new(config.gemini_api_key.clone()),
        InMemoryConversationStore::new(),
        build_tools(&config).await?,
        config.system_prompt.clone(),
        config.ai.clone(),
        config.policy.clone(),
    ));
    let tools = ai_service.tools();
    tracing::info!(tools = ?tools.names(), "Registered {} tools", tools.len());

    let sender = Arc::new(WhatsAppCloudClient::new(
        config.whatsapp.access_token.clone(),
        config.whatsapp.phone_number_id.clone(),
        config.whatsapp.api_version.clone(),
    ));

    let access = SenderAccess::new(&config.allowed_senders);
    if access.allows_everyone() {
        tracing::warn!("ALLOWED_SENDERS is empty; every sender can use the assistant");
    }

    let router = MessageRouter::new(ai_service, sender, access, config.allow_group_messages);

    // ========================================================================
    // WEBHOOK SERVER
    // ========================================================================

    let app = webhook_router(WebhookState {
        verify_token: Arc::from(config.whatsapp.verify_token.as_str()),
        queues: SenderQueues::new(Arc::new(router)),
    });

    serve(app, config.port)
        .await
        .context("Webhook server stopped")?;

    Ok(())
}
