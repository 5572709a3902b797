//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::jwt::JwtManager;
use crate::policy::AccessGuard;
use crate::repository::{
    DeniedDomainRepositoryImpl, InstitutionRepositoryImpl, LookupRepositoryImpl,
};
use crate::service::{InstitutionService, LookupService};
use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub institution_service:
        Arc<InstitutionService<InstitutionRepositoryImpl, DeniedDomainRepositoryImpl>>,
    pub lookup_service: Arc<LookupService<LookupRepositoryImpl>>,
    pub jwt: JwtManager,
    pub guard: AccessGuard,
}

impl AppState {
    pub fn new(config: Config, db_pool: PgPool) -> Result<Self> {
        let institution_repo = Arc::new(InstitutionRepositoryImpl::new(db_pool.clone()));
        let denied_domain_repo = Arc::new(DeniedDomainRepositoryImpl::new(db_pool.clone()));
        let lookup_repo = Arc::new(LookupRepositoryImpl::new(db_pool.clone()));

        let institution_service = Arc::new(InstitutionService::new(
            institution_repo,
            denied_domain_repo,
        ));
        let lookup_service = Arc::new(LookupService::new(lookup_repo));

        let jwt = JwtManager::new(&config.auth)?;
        let guard = AccessGuard::new(config.admin_scopes.clone());

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            institution_service,
            lookup_service,
            jwt,
            guard,
        })
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let institutions = Router::new()
        .route("/", get(api::institution::search).post(api::institution::upsert))
        .route("/associated", get(api::institution::associated))
        .route("/regulators", get(api::institution::regulators))
        .route("/address-states", get(api::institution::address_states))
        .route("/domains/allowed", get(api::institution::domain_allowed))
        .route("/types/{group}", get(api::institution::types))
        .route("/{lei}", get(api::institution::get))
        .route("/{lei}/types/{group}", put(api::institution::update_types))
        .route("/{lei}/domains", post(api::institution::add_domains));

    Router::new()
        .route("/health", get(api::health::health))
        .route("/v1/admin/me", get(api::admin::me))
        .nest("/v1/institutions", institutions)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the server
pub async fn run(config: Config) -> Result<()> {
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;
    info!("Connected to database");

    sqlx::migrate!("./migrations").run(&db_pool).await?;
    info!("Migrations applied");

    let http_addr = config.http_addr();
    let state = AppState::new(config, db_pool)?;
    let app = build_router(state);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, DatabaseConfig};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const TEST_SECRET: &str = "test-secret-key-for-token-signing-must-be-long";

    fn test_config() -> Config {
        Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            database: DatabaseConfig {
                url: "postgres://localhost/fi_registry_test".to_string(),
                max_connections: 1,
                min_connections: 1,
            },
            auth: AuthConfig {
                secret: TEST_SECRET.to_string(),
                issuer: "https://idp.test".to_string(),
                audience: "fi-registry".to_string(),
                leeway_secs: 5,
                public_key_pem: None,
            },
            admin_scopes: ["query-groups", "manage-users"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    fn test_router() -> Router {
        // Lazy pool: no connection is made until a handler touches the
        // database, which none of these routes do.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/fi_registry_test")
            .unwrap();
        build_router(AppState::new(test_config(), pool).unwrap())
    }

    fn bearer_token() -> String {
        let claims = serde_json::json!({
            "sub": "test_user_id",
            "name": "Test User",
            "preferred_username": "test_user",
            "email": "test_user@test.bank",
            "scope": "query-groups manage-users",
            "iss": "https://idp.test",
            "aud": "fi-registry",
            "exp": chrono::Utc::now().timestamp() + 3600,
        });
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_institutions_require_bearer_token() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/v1/institutions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_echoes_identity_with_valid_token() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/v1/admin/me")
                    .header("authorization", format!("Bearer {}", bearer_token()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/v1/admin/me")
                    .header("authorization", "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
