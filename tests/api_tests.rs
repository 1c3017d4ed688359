use std::{io::Cursor, sync::Arc};

use recipe_api::{
    config::Config,
    memory::MemoryStore,
    routes::{api, AppContext},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use warp::{http::StatusCode, hyper::body::Bytes, test::request, Filter, Reply};

const PASSWORD: &str = "testpassword";

fn setup() -> (AppContext, TempDir) {
    let media = tempfile::tempdir().unwrap();
    let config = Config {
        jwt_secret: String::from("test-secret"),
        media_root: media.path().to_path_buf(),
        ..Config::default()
    };

    (AppContext::new(Arc::new(MemoryStore::new()), config), media)
}

fn body(res: &warp::http::Response<Bytes>) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

async fn token<F>(api: &F, email: &str) -> String
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let res = request()
        .method("POST")
        .path("/api/user/create/")
        .json(&json!({"email": email, "password": PASSWORD, "name": "Test Name"}))
        .reply(api)
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = request()
        .method("POST")
        .path("/api/user/token/")
        .json(&json!({"email": email, "password": PASSWORD}))
        .reply(api)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let token = body(&res)["token"].as_str().unwrap().to_string();
    format!("Token {token}")
}

async fn send<F>(
    api: &F,
    auth: &str,
    method: &str,
    path: &str,
    payload: Option<Value>,
) -> (StatusCode, Value)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let mut builder = request()
        .method(method)
        .path(path)
        .header("authorization", auth);
    if let Some(payload) = payload {
        builder = builder.json(&payload);
    }

    let res = builder.reply(api).await;
    let value = if res.body().is_empty() {
        Value::Null
    } else {
        body(&res)
    };
    (res.status(), value)
}

fn names(labels: &Value) -> Vec<&str> {
    labels
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["name"].as_str().unwrap())
        .collect()
}

fn sample_recipe() -> Value {
    json!({
        "title": "Test Recipe",
        "time_minutes": 10,
        "price": 10.00,
        "ingredients": [{"name": "ingredient1"}, {"name": "test2"}],
    })
}

fn png() -> Vec<u8> {
    let mut data = Vec::new();
    image::DynamicImage::new_rgb8(10, 10)
        .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
        .unwrap();
    data
}

fn multipart(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"--X-BOUNDARY\r\n");
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n--X-BOUNDARY--\r\n");
    body
}

#[tokio::test]
async fn requests_without_credentials_are_unauthorized() {
    let (ctx, _media) = setup();
    let api = api(ctx);

    for path in [
        "/api/recipe/recipes/",
        "/api/recipe/tags/",
        "/api/recipe/ingredients/",
        "/api/user/me/",
    ] {
        let res = request().method("GET").path(path).reply(&api).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(
            body(&res)["detail"],
            "Authentication credentials were not provided."
        );
    }

    let (status, _) = send(&api, "Token forged", "GET", "/api/recipe/recipes/", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_issue_token_and_manage_profile() {
    let (ctx, _media) = setup();
    let api = api(ctx);

    let res = request()
        .method("POST")
        .path("/api/user/create/")
        .json(&json!({"email": "test@EXAMPLE.com", "password": PASSWORD, "name": "Test Name"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = body(&res);
    assert_eq!(created["email"], "test@example.com");
    assert!(created.get("password").is_none());

    let res = request()
        .method("POST")
        .path("/api/user/create/")
        .json(&json!({"email": "test@example.com", "password": PASSWORD, "name": "Again"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body(&res)["email"].is_array());

    let res = request()
        .method("POST")
        .path("/api/user/token/")
        .json(&json!({"email": "test@example.com", "password": "wrong"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body(&res)["non_field_errors"].is_array());

    let auth = {
        let res = request()
            .method("POST")
            .path("/api/user/token/")
            .json(&json!({"email": "test@example.com", "password": PASSWORD}))
            .reply(&api)
            .await;
        format!("Token {}", body(&res)["token"].as_str().unwrap())
    };

    let (status, me) = send(&api, &auth, "GET", "/api/user/me/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me, json!({"id": created["id"], "email": "test@example.com", "name": "Test Name"}));

    let (status, me) = send(
        &api,
        &auth,
        "PATCH",
        "/api/user/me/",
        Some(json!({"name": "New Name"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "New Name");

    let (status, errors) = send(
        &api,
        &auth,
        "PUT",
        "/api/user/me/",
        Some(json!({"name": "Only Name"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(errors["email"].is_array());

    let (status, _) = send(&api, &auth, "DELETE", "/api/user/me/", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&api, &auth, "GET", "/api/user/me/", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_recipe_with_nested_ingredients() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let (status, recipe) = send(
        &api,
        &auth,
        "POST",
        "/api/recipe/recipes/",
        Some(sample_recipe()),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(recipe["title"], "Test Recipe");
    assert_eq!(recipe["price"], "10.00");
    assert_eq!(recipe["image"], Value::Null);
    assert_eq!(names(&recipe["ingredients"]), vec!["ingredient1", "test2"]);
    assert_eq!(recipe["tags"], json!([]));

    let (_, ingredients) = send(&api, &auth, "GET", "/api/recipe/ingredients/", None).await;
    assert_eq!(names(&ingredients), vec!["test2", "ingredient1"]);
}

#[tokio::test]
async fn invalid_create_persists_nothing() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let (status, errors) = send(
        &api,
        &auth,
        "POST",
        "/api/recipe/recipes/",
        Some(json!({
            "time_minutes": 10,
            "price": "1.234",
            "tags": [{"name": "Vegan"}, {}],
            "ingredients": [{"name": "Salt"}],
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors["title"], json!(["This field is required."]));
    assert_eq!(
        errors["price"],
        json!(["Ensure that there are no more than 2 decimal places."])
    );
    assert_eq!(errors["tags.1.name"], json!(["This field is required."]));

    let (_, recipes) = send(&api, &auth, "GET", "/api/recipe/recipes/", None).await;
    assert_eq!(recipes, json!([]));
    let (_, tags) = send(&api, &auth, "GET", "/api/recipe/tags/", None).await;
    assert_eq!(tags, json!([]));
    let (_, ingredients) = send(&api, &auth, "GET", "/api/recipe/ingredients/", None).await;
    assert_eq!(ingredients, json!([]));
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let res = request()
        .method("POST")
        .path("/api/recipe/recipes/")
        .header("authorization", &auth)
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body(&res)["detail"].as_str().unwrap().starts_with("JSON parse error"));
}

#[tokio::test]
async fn existing_ingredient_is_reused() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let (_, first) = send(&api, &auth, "POST", "/api/recipe/recipes/", Some(sample_recipe())).await;
    let (_, second) = send(
        &api,
        &auth,
        "POST",
        "/api/recipe/recipes/",
        Some(json!({
            "title": "Second",
            "time_minutes": 5,
            "price": "2.50",
            "ingredients": [{"name": "ingredient1"}],
        })),
    )
    .await;

    assert_eq!(second["ingredients"][0]["id"], first["ingredients"][0]["id"]);
    let (_, ingredients) = send(&api, &auth, "GET", "/api/recipe/ingredients/", None).await;
    assert_eq!(ingredients.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn update_replaces_supplied_collections_only() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let (_, recipe) = send(
        &api,
        &auth,
        "POST",
        "/api/recipe/recipes/",
        Some(json!({
            "title": "Curry",
            "time_minutes": 40,
            "price": "12.00",
            "tags": [{"name": "Spicy"}, {"name": "Dinner"}],
            "ingredients": [{"name": "Rice"}, {"name": "Chili"}, {"name": "Onion"}],
        })),
    )
    .await;
    let path = format!("/api/recipe/recipes/{}/", recipe["id"]);

    let (status, updated) = send(
        &api,
        &auth,
        "PATCH",
        &path,
        Some(json!({"ingredients": [{"name": "Chili"}, {"name": "Garlic"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&updated["ingredients"]), vec!["Chili", "Garlic"]);
    assert_eq!(names(&updated["tags"]), vec!["Dinner", "Spicy"]);

    let (_, updated) = send(&api, &auth, "PATCH", &path, Some(json!({"tags": []}))).await;
    assert_eq!(updated["tags"], json!([]));
    assert_eq!(names(&updated["ingredients"]), vec!["Chili", "Garlic"]);

    let (_, updated) = send(&api, &auth, "PATCH", &path, Some(json!({"title": "Mild curry"}))).await;
    assert_eq!(updated["title"], "Mild curry");
    assert_eq!(names(&updated["ingredients"]), vec!["Chili", "Garlic"]);

    let (status, errors) = send(&api, &auth, "PUT", &path, Some(json!({"title": "Incomplete"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(errors["time_minutes"].is_array());

    let (status, replaced) = send(
        &api,
        &auth,
        "PUT",
        &path,
        Some(json!({"title": "Stew", "time_minutes": 90, "price": 8})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["price"], "8.00");
    assert_eq!(names(&replaced["ingredients"]), vec!["Chili", "Garlic"]);
}

#[tokio::test]
async fn users_cannot_see_each_others_data() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let alice = token(&api, "alice@example.com").await;
    let bob = token(&api, "bob@example.com").await;

    let (_, recipe) = send(&api, &alice, "POST", "/api/recipe/recipes/", Some(sample_recipe())).await;
    let path = format!("/api/recipe/recipes/{}/", recipe["id"]);
    let ingredient = format!("/api/recipe/ingredients/{}/", recipe["ingredients"][0]["id"]);

    let (_, list) = send(&api, &bob, "GET", "/api/recipe/recipes/", None).await;
    assert_eq!(list, json!([]));

    for (method, target, payload) in [
        ("GET", &path, None),
        ("PATCH", &path, Some(json!({"title": "Stolen"}))),
        ("DELETE", &path, None),
        ("GET", &ingredient, None),
        ("PATCH", &ingredient, Some(json!({"name": "Stolen"}))),
        ("DELETE", &ingredient, None),
    ] {
        let (status, res) = send(&api, &bob, method, target, payload).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {target}");
        assert_eq!(res, json!({"detail": "Not found."}));
    }

    let (status, mine) = send(&api, &alice, "GET", &path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["title"], "Test Recipe");
}

#[tokio::test]
async fn labels_are_listed_renamed_and_deleted() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let (_, recipe) = send(
        &api,
        &auth,
        "POST",
        "/api/recipe/recipes/",
        Some(json!({
            "title": "Cake",
            "time_minutes": 45,
            "price": "6.00",
            "tags": [{"name": "Breakfast"}, {"name": "Dessert"}, {"name": "Vegan"}],
        })),
    )
    .await;

    let (_, tags) = send(&api, &auth, "GET", "/api/recipe/tags/", None).await;
    assert_eq!(names(&tags), vec!["Vegan", "Dessert", "Breakfast"]);

    let vegan = format!("/api/recipe/tags/{}/", tags[0]["id"]);
    let (status, errors) = send(&api, &auth, "PATCH", &vegan, Some(json!({"name": "Dessert"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors["name"], json!(["tag with this name already exists."]));

    let (status, renamed) = send(&api, &auth, "PUT", &vegan, Some(json!({"name": "Plant based"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed, json!({"id": tags[0]["id"], "name": "Plant based"}));

    let (status, _) = send(&api, &auth, "DELETE", &vegan, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, recipe) = send(
        &api,
        &auth,
        "GET",
        &format!("/api/recipe/recipes/{}/", recipe["id"]),
        None,
    )
    .await;
    assert_eq!(names(&recipe["tags"]), vec!["Breakfast", "Dessert"]);
}

#[tokio::test]
async fn deleted_recipe_is_gone() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let (_, recipe) = send(&api, &auth, "POST", "/api/recipe/recipes/", Some(sample_recipe())).await;
    let path = format!("/api/recipe/recipes/{}/", recipe["id"]);

    let (status, _) = send(&api, &auth, "DELETE", &path, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&api, &auth, "GET", &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, ingredients) = send(&api, &auth, "GET", "/api/recipe/ingredients/", None).await;
    assert_eq!(ingredients.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn list_is_newest_first_without_detail_fields() {
    let (ctx, _media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    for title in ["First", "Second"] {
        send(
            &api,
            &auth,
            "POST",
            "/api/recipe/recipes/",
            Some(json!({"title": title, "time_minutes": 1, "price": "1.00", "description": "x"})),
        )
        .await;
    }

    let (_, list) = send(&api, &auth, "GET", "/api/recipe/recipes/", None).await;
    assert_eq!(list[0]["title"], "Second");
    assert_eq!(list[1]["title"], "First");
    assert!(list[0].get("description").is_none());
    assert!(list[0].get("image").is_none());
}

#[tokio::test]
async fn image_upload_is_stored_and_served() {
    let (ctx, media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let (_, recipe) = send(&api, &auth, "POST", "/api/recipe/recipes/", Some(sample_recipe())).await;
    let upload = format!("/api/recipe/recipes/{}/upload-image/", recipe["id"]);
    let image = png();

    let res = request()
        .method("POST")
        .path(&upload)
        .header("authorization", &auth)
        .header("content-type", "multipart/form-data; boundary=X-BOUNDARY")
        .body(multipart("image", "photo.png", &image))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let uploaded = body(&res);
    assert_eq!(uploaded["id"], recipe["id"]);

    let url = uploaded["image"].as_str().unwrap().to_string();
    assert!(url.starts_with("/media/uploads/recipes/"));
    assert!(url.ends_with(".png"));
    let stored = media.path().join(url.trim_start_matches("/media/"));
    assert_eq!(std::fs::read(stored).unwrap(), image);

    let served = request().method("GET").path(&url).reply(&api).await;
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(served.body().as_ref(), image.as_slice());

    let (_, detail) = send(
        &api,
        &auth,
        "GET",
        &format!("/api/recipe/recipes/{}/", recipe["id"]),
        None,
    )
    .await;
    assert_eq!(detail["image"], url);
}

#[tokio::test]
async fn image_upload_rejects_other_files() {
    let (ctx, media) = setup();
    let api = api(ctx);
    let auth = token(&api, "user@example.com").await;

    let (_, recipe) = send(&api, &auth, "POST", "/api/recipe/recipes/", Some(sample_recipe())).await;
    let upload = format!("/api/recipe/recipes/{}/upload-image/", recipe["id"]);

    let res = request()
        .method("POST")
        .path(&upload)
        .header("authorization", &auth)
        .header("content-type", "multipart/form-data; boundary=X-BOUNDARY")
        .body(multipart("image", "notes.txt", b"notimage"))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body(&res)["image"].is_array());
    assert!(!media.path().join("uploads").exists());

    let res = request()
        .method("POST")
        .path("/api/recipe/recipes/999/upload-image/")
        .header("authorization", &auth)
        .header("content-type", "multipart/form-data; boundary=X-BOUNDARY")
        .body(multipart("image", "photo.png", &png()))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let (ctx, _media) = setup();
    let api = api(ctx);

    let res = request().method("GET").path("/api/nothing/").reply(&api).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = request().method("DELETE").path("/api/recipe/recipes/").reply(&api).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}
