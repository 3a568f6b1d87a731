use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    checklist::Checklist,
    domain::{
        Character, CharacterId, Project, ProjectId, ProjectText, QuestionId, Response, ResponseId,
        TextId, User,
    },
    error::ApiError,
    protocol::{
        AnalysisRequest, CharacterAnalysis, ChecklistSummary, CreateProjectRequest, ExportFormat,
        LoginRequest, PasswordResetConfirm, PasswordResetRequest, RegisterRequest,
        ReplaceAnswersRequest, SaveResponseRequest, TokenResponse, UpdateCharacterRequest,
    },
};
use tracing::{debug, debug_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

pub mod auth;
pub mod autosave;
pub mod cache;
pub mod error;
pub mod navigator;
pub mod progress;
pub mod reconcile;
pub mod session;

pub use autosave::{Autosave, AutosaveSink, TextEdit};
pub use cache::QueryCache;
pub use error::{ClientError, ClientResult};
pub use navigator::{Breadcrumb, Navigator};
pub use session::ChecklistSession;

use cache::keys;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_ID_HEADER: &str = "x-request-id";

/// The calls a checklist session makes against the backend.
#[async_trait]
pub trait ChecklistApi: Send + Sync {
    async fn fetch_checklist(&self, slug: &str, character_id: CharacterId)
        -> ClientResult<Checklist>;
    async fn save_response(&self, request: SaveResponseRequest) -> ClientResult<Response>;
    async fn replace_answers(
        &self,
        question_id: QuestionId,
        character_id: CharacterId,
        request: ReplaceAnswersRequest,
    ) -> ClientResult<Response>;
    async fn delete_response(
        &self,
        response_id: ResponseId,
        character_id: CharacterId,
    ) -> ClientResult<()>;
    async fn response_history(
        &self,
        question_id: QuestionId,
        character_id: CharacterId,
    ) -> ClientResult<Vec<Response>>;

    /// Receives the tree after a mutation has been reconciled into it, so
    /// later reads can be served without another round trip.
    async fn remember_checklist(&self, _character_id: CharacterId, _checklist: &Checklist) {}
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    pub stale_after: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stale_after: cache::DEFAULT_STALE_AFTER,
        }
    }
}

/// REST client for the character analysis backend. Cheap to clone; clones
/// share the HTTP pool and the query cache.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
    cache: Arc<QueryCache>,
}

impl ApiClient {
    pub fn new(base_url: &str, options: ClientOptions) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            token: None,
            cache: Arc::new(QueryCache::new(options.stale_after)),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<User> {
        let builder = self.request(Method::POST, "api/auth/register", false)?;
        self.send_json(builder.json(request)).await
    }

    /// Signs in and keeps the bearer token for later calls.
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<TokenResponse> {
        let builder = self.request(Method::POST, "api/auth/login", false)?;
        let token: TokenResponse = self
            .send_json(builder.json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            }))
            .await?;
        self.token = Some(token.access_token.clone());
        Ok(token)
    }

    pub async fn me(&self) -> ClientResult<User> {
        let builder = self.request(Method::GET, "api/auth/me", true)?;
        self.send_json(builder).await
    }

    pub async fn request_password_reset(&self, email: &str) -> ClientResult<()> {
        let builder = self.request(Method::POST, "api/auth/password-reset/request", false)?;
        self.send_empty(builder.json(&PasswordResetRequest {
            email: email.to_string(),
        }))
        .await
    }

    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> ClientResult<()> {
        let builder = self.request(Method::POST, "api/auth/password-reset/confirm", false)?;
        self.send_empty(builder.json(&PasswordResetConfirm {
            token: token.to_string(),
            new_password: new_password.to_string(),
        }))
        .await
    }

    pub async fn list_projects(&self) -> ClientResult<Vec<Project>> {
        self.cached_get(keys::PROJECTS, self.endpoint("api/projects")?)
            .await
    }

    pub async fn create_project(&self, request: &CreateProjectRequest) -> ClientResult<Project> {
        let builder = self.request(Method::POST, "api/projects", true)?;
        let project: Project = self.send_json(builder.json(request)).await?;
        self.cache.invalidate(keys::PROJECTS).await;
        Ok(project)
    }

    pub async fn list_texts(&self, project_id: ProjectId) -> ClientResult<Vec<ProjectText>> {
        self.cached_get(
            &keys::texts(project_id),
            self.endpoint(&format!("api/projects/{project_id}/texts"))?,
        )
        .await
    }

    /// Uploads a document; character extraction happens on the server.
    pub async fn upload_text(
        &self,
        project_id: ProjectId,
        filename: &str,
        contents: Vec<u8>,
    ) -> ClientResult<ProjectText> {
        let part = multipart::Part::bytes(contents).file_name(filename.to_string());
        let form = multipart::Form::new().part("file", part);
        let builder = self.request(
            Method::POST,
            &format!("api/projects/{project_id}/texts"),
            true,
        )?;
        let text: ProjectText = self.send_json(builder.multipart(form)).await?;
        self.cache.invalidate(&keys::texts(project_id)).await;
        Ok(text)
    }

    pub async fn list_characters(&self, text_id: TextId) -> ClientResult<Vec<Character>> {
        self.cached_get(
            &keys::characters(text_id),
            self.endpoint(&format!("api/texts/{text_id}/characters"))?,
        )
        .await
    }

    pub async fn update_character(
        &self,
        character_id: CharacterId,
        request: &UpdateCharacterRequest,
    ) -> ClientResult<Character> {
        let builder = self.request(
            Method::PATCH,
            &format!("api/characters/{character_id}"),
            true,
        )?;
        let character: Character = self.send_json(builder.json(request)).await?;
        self.cache
            .invalidate_prefix(keys::characters_prefix())
            .await;
        Ok(character)
    }

    pub async fn list_checklists(&self) -> ClientResult<Vec<ChecklistSummary>> {
        self.cached_get(keys::CHECKLISTS, self.endpoint("api/checklists")?)
            .await
    }

    pub async fn analyze_character(
        &self,
        character_id: CharacterId,
        checklist_slug: Option<&str>,
    ) -> ClientResult<CharacterAnalysis> {
        let builder = self.request(
            Method::POST,
            &format!("api/characters/{character_id}/analysis"),
            true,
        )?;
        self.send_json(builder.json(&AnalysisRequest {
            checklist_slug: checklist_slug.map(str::to_string),
        }))
        .await
    }

    pub async fn export_character(
        &self,
        character_id: CharacterId,
        format: ExportFormat,
    ) -> ClientResult<Vec<u8>> {
        let builder = self
            .request(
                Method::GET,
                &format!("api/characters/{character_id}/export"),
                true,
            )?
            .query(&[("format", format.as_str())]);
        let response = self.send(builder).await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Appends each segment percent-encoded, so ids and slugs cannot change
    /// the request target.
    fn endpoint_with_segments(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, path: &str, authenticated: bool) -> ClientResult<RequestBuilder> {
        self.request_to(method, self.endpoint(path)?, authenticated)
    }

    fn request_to(
        &self,
        method: Method,
        url: Url,
        authenticated: bool,
    ) -> ClientResult<RequestBuilder> {
        let mut builder = self
            .http
            .request(method, url)
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        if authenticated {
            let token = self.token.as_deref().ok_or(ClientError::NotAuthenticated)?;
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> ClientResult<reqwest::Response> {
        let request = builder.build()?;
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let span = debug_span!(
            "api_request",
            method = %request.method(),
            path = request.url().path(),
            request_id = %request_id
        );

        async move {
            debug!("api: sending");
            let response = self.http.execute(request).await.map_err(|err| {
                warn!("api: transport failure error={err}");
                ClientError::from(err)
            })?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_body(status.as_u16(), &body);
            warn!(
                "api: request failed status={} code={:?} message={}",
                status.as_u16(),
                error.code,
                error.message
            );
            Err(ClientError::Http {
                status: status.as_u16(),
                error,
            })
        }
        .instrument(span)
        .await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = self.send(builder).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> ClientResult<()> {
        self.send(builder).await.map(|_| ())
    }

    async fn cached_get<T>(&self, key: &str, url: Url) -> ClientResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        self.cache
            .fetch(key, move || async move {
                let builder = client.request_to(Method::GET, url, true)?;
                client.send_json(builder).await
            })
            .await
    }

    async fn forget_character_checklists(&self, character_id: CharacterId) {
        self.cache
            .invalidate_prefix(&keys::checklists_for_character(character_id))
            .await;
    }
}

#[async_trait]
impl ChecklistApi for ApiClient {
    async fn fetch_checklist(
        &self,
        slug: &str,
        character_id: CharacterId,
    ) -> ClientResult<Checklist> {
        let url = self.endpoint_with_segments(&[
            "api",
            "checklists",
            slug,
            "character",
            &character_id.to_string(),
        ])?;
        self.cached_get(&keys::checklist(character_id, slug), url)
            .await
    }

    async fn save_response(&self, request: SaveResponseRequest) -> ClientResult<Response> {
        let character_id = request.character_id;
        let builder = self.request(Method::POST, "api/checklists/responses", true)?;
        let saved: Response = self.send_json(builder.json(&request)).await?;
        self.forget_character_checklists(character_id).await;
        self.cache
            .invalidate(&keys::history(character_id, request.question_id))
            .await;
        Ok(saved)
    }

    async fn replace_answers(
        &self,
        question_id: QuestionId,
        character_id: CharacterId,
        request: ReplaceAnswersRequest,
    ) -> ClientResult<Response> {
        let builder = self.request(
            Method::PUT,
            &format!("api/checklists/questions/{question_id}/character/{character_id}/answers"),
            true,
        )?;
        let saved: Response = self.send_json(builder.json(&request)).await?;
        self.forget_character_checklists(character_id).await;
        self.cache
            .invalidate(&keys::history(character_id, question_id))
            .await;
        Ok(saved)
    }

    async fn delete_response(
        &self,
        response_id: ResponseId,
        character_id: CharacterId,
    ) -> ClientResult<()> {
        let builder = self.request(
            Method::DELETE,
            &format!("api/checklists/responses/{response_id}"),
            true,
        )?;
        self.send_empty(builder).await?;
        self.forget_character_checklists(character_id).await;
        Ok(())
    }

    async fn response_history(
        &self,
        question_id: QuestionId,
        character_id: CharacterId,
    ) -> ClientResult<Vec<Response>> {
        self.cached_get(
            &keys::history(character_id, question_id),
            self.endpoint(&format!(
                "api/checklists/questions/{question_id}/character/{character_id}/history"
            ))?,
        )
        .await
    }

    async fn remember_checklist(&self, character_id: CharacterId, checklist: &Checklist) {
        let key = keys::checklist(character_id, &checklist.slug);
        if let Err(err) = self.cache.set(&key, checklist).await {
            warn!("cache: failed to store checklist key={key} error={err}");
        }
    }
}

fn normalize_base_url(raw: &str) -> ClientResult<Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|err| ClientError::InvalidUrl(format!("{trimmed}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl(trimmed.to_string()));
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/fixtures.rs"]
mod test_fixtures;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
