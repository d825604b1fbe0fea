// [apps/controller/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: AUTHENTICATION PLUGS
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * RESPONSABILIDAD: VALIDACIÓN DE CREDENCIALES DE LOS CINCO AUDIENCIAS
 *
 * Cada extractor valida exactamente una familia de credencial y nunca
 * hace eco del secreto recibido. La comparación siempre pasa por
 * `buildctl_core_security::secure_compare` (tiempo constante); el chequeo
 * de propiedad (¿este build pertenece a este worker?) ocurre después, en
 * el handler, como un segundo paso explícito — nunca fusionado con la
 * autenticación misma.
 * =================================================================
 */

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use buildctl_core_security::secure_compare;
use buildctl_domain_models::Worker;
use chrono::Utc;

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name)?.to_str().ok()
}

/// `X-API-Key` — the admin/operator credential. Process-wide scope.
pub struct AdminKey;

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let supplied = header_value(parts, "x-api-key").ok_or(ApiError::Unauthorized)?;
        if secure_compare(supplied, &state.config.admin_api_key) {
            Ok(AdminKey)
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// `X-Worker-Token` — identifies and authenticates a single worker. Scope
/// is that worker's own rows only; ownership of a particular build is
/// checked separately by the handler.
pub struct WorkerAuth(pub Worker);

impl FromRequestParts<AppState> for WorkerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = header_value(parts, "x-worker-token")
            .ok_or(ApiError::Unauthorized)?
            .to_string();

        let worker = state
            .workers
            .find_by_token(&token)
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        if worker.access_token_expires_at < Utc::now() {
            return Err(ApiError::Unauthorized);
        }

        Ok(WorkerAuth(worker))
    }
}

/// `X-VM-Token` — scopes the holder to exactly one build's secure
/// endpoints (certs download, telemetry ingest), minted by the
/// `authenticate` OTP exchange.
pub struct VmAuth {
    pub build_id: uuid::Uuid,
}

impl FromRequestParts<AppState> for VmAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = header_value(parts, "x-vm-token")
            .ok_or(ApiError::Unauthorized)?
            .to_string();

        let build = state
            .builds
            .find_by_vm_token(&token)
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        let expires_at = build.vm_token_expires_at.ok_or(ApiError::Unauthorized)?;
        if expires_at < Utc::now() {
            return Err(ApiError::Unauthorized);
        }

        Ok(VmAuth { build_id: build.id })
    }
}

/// Resolves the calling worker either by its rotating `X-Worker-Token`
/// (the normal path) or, for legacy pollers, by a bare `X-Worker-Id`
/// header paired with the admin key. Only `poll` accepts the legacy form.
pub enum WorkerIdentity {
    Token(Worker),
    LegacyAdmin(Worker),
}

impl WorkerIdentity {
    pub fn into_worker(self) -> Worker {
        match self {
            Self::Token(worker) | Self::LegacyAdmin(worker) => worker,
        }
    }
}

impl FromRequestParts<AppState> for WorkerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(token) = header_value(parts, "x-worker-token") {
            let token = token.to_string();
            let worker = state
                .workers
                .find_by_token(&token)
                .await
                .map_err(|_| ApiError::Unauthorized)?;

            if worker.access_token_expires_at < Utc::now() {
                return Err(ApiError::Unauthorized);
            }
            return Ok(Self::Token(worker));
        }

        let admin_key = header_value(parts, "x-api-key").ok_or(ApiError::Unauthorized)?;
        if !secure_compare(admin_key, &state.config.admin_api_key) {
            return Err(ApiError::Unauthorized);
        }

        let worker_id = header_value(parts, "x-worker-id")
            .ok_or(ApiError::Unauthorized)?
            .parse::<uuid::Uuid>()
            .map_err(|_| ApiError::Validation("invalid X-Worker-Id".into()))?;

        let worker = state
            .workers
            .find(worker_id)
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(Self::LegacyAdmin(worker))
    }
}

/// Verifies a caller-supplied `X-Build-Token` matches the build's own
/// submitter token, in constant time. Used by the artifact download and
/// result-relevant endpoints that are scoped to a single build rather than
/// a worker or an admin.
pub fn verify_build_token(parts: &Parts, expected: &str) -> Result<(), ApiError> {
    let supplied = header_value(parts, "x-build-token").ok_or(ApiError::Unauthorized)?;
    if secure_compare(supplied, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
