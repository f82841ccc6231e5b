//! In-memory stand-in for the Feedy API.
//!
//! Serves the method catalogue at the host root with the real verbs, reading
//! every argument from the query string, plus the `/upload` endpoint that
//! `attachments/server` hands out. Clients configured with `http://host/api`
//! resolve `user/get` to `http://host/user/get`, which is where it lives. Replies use the `{"response": ...}`
//! envelope; a missing or wrong `access_token` yields 401 with an `error`
//! envelope, and semantic failures yield 200 with an `error` envelope.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Id of the user the access token belongs to.
pub const OWN_USER_ID: i64 = 1;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub owner_id: i64,
    pub text: String,
    pub attachment: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Photo {
    pub id: i64,
    pub owner_id: i64,
    pub photo: String,
}

#[derive(Debug)]
pub struct Store {
    token: String,
    public_url: String,
    users: BTreeMap<i64, User>,
    subscriptions: BTreeSet<i64>,
    posts: Vec<Post>,
    /// Uploaded but not yet saved: photo -> hash.
    uploads: HashMap<String, String>,
    photos: Vec<Photo>,
}

impl Store {
    fn new(token: &str, public_url: &str) -> Self {
        let users = [
            (OWN_USER_ID, "levkopo"),
            (2, "alice"),
            (3, "alina"),
            (4, "bob"),
        ]
        .into_iter()
        .map(|(id, name)| {
            let user = User {
                id,
                name: name.to_string(),
                status: String::new(),
                avatar: None,
            };
            (id, user)
        })
        .collect();

        Self {
            token: token.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            users,
            subscriptions: BTreeSet::new(),
            posts: Vec::new(),
            uploads: HashMap::new(),
            photos: Vec::new(),
        }
    }

    fn me(&mut self) -> Result<&mut User, ApiFailure> {
        self.users
            .get_mut(&OWN_USER_ID)
            .ok_or_else(|| ApiFailure::semantic(18, "own profile is gone"))
    }
}

pub type Db = Arc<RwLock<Store>>;

type Params = HashMap<String, String>;

/// An `{"error": {...}}` reply.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    code: u32,
    message: String,
}

impl ApiFailure {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: 5,
            message: "user authorization failed".to_string(),
        }
    }

    fn semantic(code: u32, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            code,
            message: message.into(),
        }
    }

    fn bad_param(name: &str) -> Self {
        Self::semantic(100, format!("invalid parameter: {name}"))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = json!({"error": {"error_code": self.code, "error_msg": self.message}});
        (self.status, Json(body)).into_response()
    }
}

type ApiReply = Result<Json<Value>, ApiFailure>;

fn envelope(value: impl Serialize) -> ApiReply {
    let value = serde_json::to_value(value).map_err(|e| ApiFailure::semantic(1, e.to_string()))?;
    Ok(Json(json!({ "response": value })))
}

pub fn app(token: &str, public_url: &str) -> Router {
    let db: Db = Arc::new(RwLock::new(Store::new(token, public_url)));
    Router::new()
        .route("/user/get", get(get_user))
        .route("/user/photos", get(get_user_photos))
        .route("/user/subscribe", post(subscribe))
        .route("/user/unsubscribe", post(unsubscribe))
        .route("/user/avatar", put(update_avatar))
        .route("/user/status", put(update_status))
        .route("/user/subscriptions", get(get_subscriptions))
        .route("/feed/post", put(create_post))
        .route("/attachments/server", get(upload_server))
        .route("/attachments/save/photo", get(save_photo))
        .route("/upload", post(upload))
        .with_state(db)
}

/// Serve on `listener`; upload URLs point back at its local address.
pub async fn run(listener: TcpListener, token: &str) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    info!(%addr, "feedy mock server listening");
    axum::serve(listener, app(token, &format!("http://{addr}"))).await
}

fn authorize(store: &Store, params: &Params) -> Result<(), ApiFailure> {
    match params.get("access_token") {
        Some(token) if *token == store.token => Ok(()),
        _ => {
            debug!("rejecting request with bad access token");
            Err(ApiFailure::unauthorized())
        }
    }
}

fn int_param(params: &Params, name: &str) -> Result<Option<i64>, ApiFailure> {
    params
        .get(name)
        .map(|raw| raw.parse().map_err(|_| ApiFailure::bad_param(name)))
        .transpose()
}

fn str_param<'a>(params: &'a Params, name: &str) -> Result<&'a str, ApiFailure> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ApiFailure::bad_param(name))
}

async fn get_user(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let store = db.read().await;
    authorize(&store, &params)?;
    let id = match int_param(&params, "user_id")? {
        None | Some(0) => OWN_USER_ID,
        Some(id) => id,
    };
    let user = store
        .users
        .get(&id)
        .ok_or_else(|| ApiFailure::semantic(113, "invalid user id"))?;
    envelope(user)
}

async fn get_user_photos(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let store = db.read().await;
    authorize(&store, &params)?;
    let start = int_param(&params, "start_from")?.unwrap_or(0).max(0) as usize;
    let count = int_param(&params, "count")?.unwrap_or(20).max(0) as usize;
    let items: Vec<&Photo> = store.photos.iter().skip(start).take(count).collect();
    envelope(json!({"count": store.photos.len(), "items": items}))
}

async fn subscribe(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let mut store = db.write().await;
    authorize(&store, &params)?;
    let id = int_param(&params, "user_id")?.ok_or_else(|| ApiFailure::bad_param("user_id"))?;
    if id == OWN_USER_ID || !store.users.contains_key(&id) {
        return Err(ApiFailure::semantic(113, "invalid user id"));
    }
    store.subscriptions.insert(id);
    envelope(1)
}

async fn unsubscribe(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let mut store = db.write().await;
    authorize(&store, &params)?;
    let id = int_param(&params, "user_id")?.ok_or_else(|| ApiFailure::bad_param("user_id"))?;
    if !store.subscriptions.remove(&id) {
        return Err(ApiFailure::semantic(15, "not subscribed"));
    }
    envelope(1)
}

async fn update_avatar(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let mut store = db.write().await;
    authorize(&store, &params)?;
    let photo = str_param(&params, "photo")?.to_string();
    let hash = str_param(&params, "hash")?;
    if store.uploads.get(&photo).map(String::as_str) != Some(hash) {
        return Err(ApiFailure::semantic(121, "invalid photo hash"));
    }
    store.uploads.remove(&photo);
    store.me()?.avatar = Some(photo);
    envelope(1)
}

async fn update_status(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let mut store = db.write().await;
    authorize(&store, &params)?;
    let status = params.get("status").cloned().unwrap_or_default();
    store.me()?.status = status;
    envelope(1)
}

async fn get_subscriptions(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let store = db.read().await;
    authorize(&store, &params)?;
    let query = params.get("query").map(|q| q.to_lowercase());
    let items: Vec<&User> = store
        .subscriptions
        .iter()
        .filter_map(|id| store.users.get(id))
        .filter(|user| match &query {
            Some(q) => user.name.to_lowercase().contains(q.as_str()),
            None => true,
        })
        .collect();
    envelope(json!({"count": items.len(), "items": items}))
}

async fn create_post(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let mut store = db.write().await;
    authorize(&store, &params)?;
    let text = params.get("text").cloned().unwrap_or_default();
    let attachment = params.get("attachment").cloned().unwrap_or_default();
    if text.is_empty() && attachment.is_empty() {
        return Err(ApiFailure::semantic(100, "post is empty"));
    }
    let post = Post {
        id: store.posts.len() as i64 + 1,
        owner_id: OWN_USER_ID,
        text,
        attachment,
    };
    let post_id = post.id;
    store.posts.push(post);
    envelope(json!({"post_id": post_id}))
}

async fn upload_server(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let store = db.read().await;
    authorize(&store, &params)?;
    if params.get("type").map(String::as_str) != Some("photo") {
        return Err(ApiFailure::bad_param("type"));
    }
    envelope(json!({"server_url": format!("{}/upload", store.public_url)}))
}

async fn save_photo(State(db): State<Db>, Query(params): Query<Params>) -> ApiReply {
    let mut store = db.write().await;
    authorize(&store, &params)?;
    let photo = str_param(&params, "photo")?.to_string();
    let hash = str_param(&params, "hash")?;
    if store.uploads.get(&photo).map(String::as_str) != Some(hash) {
        return Err(ApiFailure::semantic(121, "invalid photo hash"));
    }
    store.uploads.remove(&photo);
    let saved = Photo {
        id: store.photos.len() as i64 + 1,
        owner_id: OWN_USER_ID,
        photo,
    };
    store.photos.push(saved.clone());
    envelope(saved)
}

/// Raw upload endpoint. Replies without the envelope.
async fn upload(State(db): State<Db>, mut multipart: Multipart) -> Result<Json<Value>, StatusCode> {
    let mut size = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("photo") {
            let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            size = Some(bytes.len());
        }
    }
    let size = size.ok_or(StatusCode::BAD_REQUEST)?;
    if size == 0 {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let photo = Uuid::new_v4().simple().to_string();
    let hash = Uuid::new_v4().simple().to_string();
    db.write().await.uploads.insert(photo.clone(), hash.clone());
    debug!(%photo, size, "stored upload");
    Ok(Json(json!({"photo": photo, "hash": hash, "size": size})))
}
