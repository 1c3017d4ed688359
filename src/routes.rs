use std::{convert::Infallible, sync::Arc};

use futures::TryStreamExt;
use serde::Serialize;
use warp::{
    filters::{body::BodyDeserializeError, multipart::FormData as MultipartForm, BoxedFilter},
    http::StatusCode,
    hyper::body::Buf,
    reject::{MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType},
    reply::{self, Response},
    Filter, Rejection, Reply,
};

use crate::{
    actions::{labels, recipes, users},
    config::Config,
    constants::{NOT_FOUND, RECIPE_IMAGE_FIELD},
    error::{ApiError, QueryErrorKind},
    form::{Form, FormData},
    jwt::SessionData,
    media::{ImageUpload, MediaStorage},
    middleware::with_session,
    payload::{label_rename, Credentials, ProfileChanges, RecipeDraft, RecipePatch, Registration},
    repository::Store,
    schema::{Id, LabelKind},
};

const MAX_JSON_BYTES: u64 = 64 * 1024;

/// Everything a request handler needs, cloned into every route.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub media: Arc<MediaStorage>,
    secret: Arc<str>,
}

impl AppContext {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let media = MediaStorage::new(config.media_root.to_owned(), &config.media_url);
        let secret = Arc::from(config.jwt_secret.as_str());

        Self {
            store,
            config: Arc::new(config),
            media: Arc::new(media),
            secret,
        }
    }

    fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.config.token_lifetime_hours)
    }
}

fn with_context(ctx: AppContext) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_form() -> impl Filter<Extract = (Form,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_JSON_BYTES)
        .and(warp::body::json::<FormData>())
        .map(Form::from_data)
}

/// `false` for `PUT`, `true` for `PATCH`.
fn partial_update() -> impl Filter<Extract = (bool,), Error = Rejection> + Clone {
    warp::put()
        .map(|| false)
        .or(warp::patch().map(|| true))
        .unify()
}

fn reject(e: ApiError) -> Rejection {
    warp::reject::custom(e)
}

fn created<T: Serialize>(value: &T) -> reply::WithStatus<reply::Json> {
    reply::with_status(reply::json(value), StatusCode::CREATED)
}

fn no_content() -> reply::WithStatus<&'static str> {
    reply::with_status("", StatusCode::NO_CONTENT)
}

pub fn api(ctx: AppContext) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    user_routes(ctx.clone())
        .or(recipe_routes(ctx.clone()))
        .or(label_routes(ctx.clone(), LabelKind::Tag))
        .or(label_routes(ctx.clone(), LabelKind::Ingredient))
        .or(media_routes(&ctx))
        .recover(handle_rejection)
        .with(warp::log("recipe_api::http"))
}

// Users

fn user_routes(ctx: AppContext) -> BoxedFilter<(impl Reply,)> {
    let session = with_session(ctx.secret.clone());

    let register = warp::path!("api" / "user" / "create")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(json_form())
        .and_then(register);

    let token = warp::path!("api" / "user" / "token")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(json_form())
        .and_then(token);

    let me = warp::path!("api" / "user" / "me");

    let get_me = me
        .clone()
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and_then(get_me);

    let update_me = me
        .clone()
        .and(partial_update())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and(json_form())
        .and_then(update_me);

    let delete_me = me
        .and(warp::delete())
        .and(with_context(ctx))
        .and(session)
        .and_then(delete_me);

    register
        .or(token)
        .or(get_me)
        .or(update_me)
        .or(delete_me)
        .boxed()
}

async fn register(ctx: AppContext, form: Form) -> Result<impl Reply, Rejection> {
    let registration = Registration::from_form(&form).map_err(|e| reject(e.into()))?;
    let profile = users::register_user(ctx.store.as_ref(), registration)
        .await
        .map_err(reject)?;

    Ok(created(&profile))
}

async fn token(ctx: AppContext, form: Form) -> Result<impl Reply, Rejection> {
    let credentials = Credentials::from_form(&form).map_err(|e| reject(e.into()))?;
    let token = users::login_user(
        ctx.store.as_ref(),
        credentials,
        &ctx.secret,
        ctx.token_lifetime(),
    )
    .await
    .map_err(reject)?;

    Ok(reply::json(&token))
}

async fn get_me(ctx: AppContext, session: SessionData) -> Result<impl Reply, Rejection> {
    let profile = users::get_profile(ctx.store.as_ref(), &session)
        .await
        .map_err(reject)?;

    Ok(reply::json(&profile))
}

async fn update_me(
    partial: bool,
    ctx: AppContext,
    session: SessionData,
    form: Form,
) -> Result<impl Reply, Rejection> {
    let changes = ProfileChanges::from_form(&form, partial).map_err(|e| reject(e.into()))?;
    let profile = users::update_profile(ctx.store.as_ref(), &session, changes)
        .await
        .map_err(reject)?;

    Ok(reply::json(&profile))
}

async fn delete_me(ctx: AppContext, session: SessionData) -> Result<impl Reply, Rejection> {
    users::delete_account(ctx.store.as_ref(), &session)
        .await
        .map_err(reject)?;

    Ok(no_content())
}

// Recipes

fn recipe_routes(ctx: AppContext) -> BoxedFilter<(impl Reply,)> {
    let session = with_session(ctx.secret.clone());
    let collection = warp::path!("api" / "recipe" / "recipes");
    let item = warp::path!("api" / "recipe" / "recipes" / Id);

    let list = collection
        .clone()
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and_then(list_recipes);

    let create = collection
        .clone()
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and(json_form())
        .and_then(create_recipe);

    let detail = item
        .clone()
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and_then(get_recipe);

    let update = item
        .clone()
        .and(partial_update())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and(json_form())
        .and_then(update_recipe);

    let delete = item
        .and(warp::delete())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and_then(delete_recipe);

    let upload = warp::path!("api" / "recipe" / "recipes" / Id / "upload-image")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(session)
        .and(warp::multipart::form().max_length(ctx.config.max_upload_bytes))
        .and_then(upload_image);

    list.or(create)
        .or(detail)
        .or(update)
        .or(delete)
        .or(upload)
        .boxed()
}

async fn list_recipes(ctx: AppContext, session: SessionData) -> Result<impl Reply, Rejection> {
    let list = recipes::list_recipes(ctx.store.as_ref(), &session)
        .await
        .map_err(reject)?;

    Ok(reply::json(&list))
}

async fn create_recipe(
    ctx: AppContext,
    session: SessionData,
    form: Form,
) -> Result<impl Reply, Rejection> {
    let draft = RecipeDraft::from_form(&form).map_err(|e| reject(e.into()))?;
    let detail = recipes::create_recipe(ctx.store.as_ref(), &ctx.media, &session, draft)
        .await
        .map_err(reject)?;

    Ok(created(&detail))
}

async fn get_recipe(
    id: Id,
    ctx: AppContext,
    session: SessionData,
) -> Result<impl Reply, Rejection> {
    let detail = recipes::get_recipe(ctx.store.as_ref(), &ctx.media, &session, id)
        .await
        .map_err(reject)?;

    Ok(reply::json(&detail))
}

async fn update_recipe(
    id: Id,
    partial: bool,
    ctx: AppContext,
    session: SessionData,
    form: Form,
) -> Result<impl Reply, Rejection> {
    let patch = RecipePatch::from_form(&form, partial).map_err(|e| reject(e.into()))?;
    let detail = recipes::update_recipe(ctx.store.as_ref(), &ctx.media, &session, id, patch)
        .await
        .map_err(reject)?;

    Ok(reply::json(&detail))
}

async fn delete_recipe(
    id: Id,
    ctx: AppContext,
    session: SessionData,
) -> Result<impl Reply, Rejection> {
    recipes::delete_recipe(ctx.store.as_ref(), &ctx.media, &session, id)
        .await
        .map_err(reject)?;

    Ok(no_content())
}

/// Reads the first part named `image`. Other parts are skipped.
async fn read_image(form: MultipartForm) -> Result<Option<ImageUpload>, ApiError> {
    let malformed = |e: warp::Error| ApiError::invalid("image", &format!("Malformed upload: {e}"));
    futures::pin_mut!(form);

    while let Some(part) = form.try_next().await.map_err(malformed)? {
        if part.name() != RECIPE_IMAGE_FIELD {
            continue;
        }

        let filename = part.filename().unwrap_or_default().to_string();
        let data = part
            .stream()
            .try_fold(Vec::new(), |mut data, mut chunk| async move {
                data.extend_from_slice(&chunk.copy_to_bytes(chunk.remaining()));
                Ok::<_, warp::Error>(data)
            })
            .await
            .map_err(malformed)?;

        return Ok(Some(ImageUpload { filename, data }));
    }

    Ok(None)
}

async fn upload_image(
    id: Id,
    ctx: AppContext,
    session: SessionData,
    form: MultipartForm,
) -> Result<impl Reply, Rejection> {
    let upload = read_image(form).await.map_err(reject)?;
    let image = recipes::upload_image(ctx.store.as_ref(), &ctx.media, &session, id, upload)
        .await
        .map_err(reject)?;

    Ok(reply::json(&image))
}

// Tags and ingredients

fn label_routes(ctx: AppContext, kind: LabelKind) -> BoxedFilter<(impl Reply,)> {
    let session = with_session(ctx.secret.clone());
    let collection = warp::path!("api" / "recipe" / ..)
        .and(warp::path(kind.table()))
        .and(warp::path::end());
    let item = warp::path!("api" / "recipe" / ..)
        .and(warp::path(kind.table()))
        .and(warp::path::param::<Id>())
        .and(warp::path::end());

    let list = collection
        .clone()
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and_then(move |ctx: AppContext, session: SessionData| {
            list_labels(ctx, session, kind)
        });

    let detail = item
        .clone()
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and_then(move |id: Id, ctx: AppContext, session: SessionData| {
            get_label(id, ctx, session, kind)
        });

    let rename = item
        .clone()
        .and(partial_update())
        .and(with_context(ctx.clone()))
        .and(session.clone())
        .and(json_form())
        .and_then(
            move |id: Id, _partial: bool, ctx: AppContext, session: SessionData, form: Form| {
                rename_label(id, ctx, session, form, kind)
            },
        );

    let delete = item
        .and(warp::delete())
        .and(with_context(ctx))
        .and(session)
        .and_then(move |id: Id, ctx: AppContext, session: SessionData| {
            delete_label(id, ctx, session, kind)
        });

    list.or(detail).or(rename).or(delete).boxed()
}

async fn list_labels(
    ctx: AppContext,
    session: SessionData,
    kind: LabelKind,
) -> Result<impl Reply, Rejection> {
    let list = labels::list_labels(ctx.store.as_ref(), &session, kind)
        .await
        .map_err(reject)?;

    Ok(reply::json(&list))
}

async fn get_label(
    id: Id,
    ctx: AppContext,
    session: SessionData,
    kind: LabelKind,
) -> Result<impl Reply, Rejection> {
    let label = labels::get_label(ctx.store.as_ref(), &session, kind, id)
        .await
        .map_err(reject)?;

    Ok(reply::json(&label))
}

async fn rename_label(
    id: Id,
    ctx: AppContext,
    session: SessionData,
    form: Form,
    kind: LabelKind,
) -> Result<impl Reply, Rejection> {
    let name = label_rename(&form).map_err(|e| reject(e.into()))?;
    let label = labels::rename_label(ctx.store.as_ref(), &session, kind, id, &name)
        .await
        .map_err(reject)?;

    Ok(reply::json(&label))
}

async fn delete_label(
    id: Id,
    ctx: AppContext,
    session: SessionData,
    kind: LabelKind,
) -> Result<impl Reply, Rejection> {
    labels::delete_label(ctx.store.as_ref(), &session, kind, id)
        .await
        .map_err(reject)?;

    Ok(no_content())
}

// Uploaded files

fn media_routes(ctx: &AppContext) -> BoxedFilter<(warp::fs::File,)> {
    let mount = ctx
        .config
        .media_mount()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(warp::any().boxed(), |filter, segment| {
            filter.and(warp::path(segment.to_string())).boxed()
        });

    mount
        .and(warp::get())
        .and(warp::fs::dir(ctx.media.root().to_path_buf()))
        .boxed()
}

// Errors

#[derive(Serialize)]
struct Detail {
    detail: String,
}

fn detail(status: StatusCode, detail: impl Into<String>) -> Response {
    reply::with_status(
        reply::json(&Detail {
            detail: detail.into(),
        }),
        status,
    )
    .into_response()
}

fn api_error_response(e: &ApiError) -> Response {
    match e {
        ApiError::Validation(errors) => {
            reply::with_status(reply::json(errors), StatusCode::BAD_REQUEST).into_response()
        }
        ApiError::NotAuthenticated | ApiError::AuthenticationFailed(_) => reply::with_header(
            detail(StatusCode::UNAUTHORIZED, e.to_string()),
            "www-authenticate",
            "Token",
        )
        .into_response(),
        ApiError::NotFound => detail(StatusCode::NOT_FOUND, NOT_FOUND),
        ApiError::Query(query) if query.kind() == QueryErrorKind::Unavailable => {
            log::error!("{e}");
            detail(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable, try again later.",
            )
        }
        ApiError::Query(_) | ApiError::Media(_) | ApiError::Internal(_) => {
            log::error!("{e}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "A server error occurred.")
        }
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(e) = err.find::<ApiError>() {
        return Ok(api_error_response(e));
    }

    let response = if err.is_not_found() {
        detail(StatusCode::NOT_FOUND, NOT_FOUND)
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        detail(StatusCode::BAD_REQUEST, format!("JSON parse error - {e}"))
    } else if err.find::<PayloadTooLarge>().is_some() {
        detail(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large.")
    } else if err.find::<UnsupportedMediaType>().is_some() {
        detail(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported media type in request.",
        )
    } else if err.find::<MethodNotAllowed>().is_some() {
        detail(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.")
    } else {
        log::error!("Unhandled rejection: {err:?}");
        detail(StatusCode::BAD_REQUEST, "Bad request.")
    };

    Ok(response)
}
