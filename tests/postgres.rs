//! Runs against the database named by `DATABASE_URL` and is skipped when it
//! is unset. Every test works under its own freshly created user.

use std::sync::Arc;

use recipe_api::{
    actions::recipes::{create_recipe, update_recipe},
    form::Form,
    jwt::SessionData,
    media::MediaStorage,
    payload::{RecipeDraft, RecipePatch},
    postgres::PgStore,
    repository::Store,
    schema::{Id, Label, LabelKind, NewUser},
};
use serde_json::{json, Value};
use uuid::Uuid;

async fn connect() -> Option<Arc<PgStore>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let store = PgStore::connect(&url, 10, 1).await.unwrap();
    store.migrate().await.unwrap();

    Some(Arc::new(store))
}

async fn session(store: &PgStore) -> SessionData {
    let mut tx = store.begin().await.unwrap();
    let user = tx
        .insert_user(NewUser {
            email: format!("{}@example.com", Uuid::new_v4()),
            password: String::from("hash"),
            name: String::from("name"),
            is_staff: false,
            is_superuser: false,
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();

    SessionData {
        user_id: user.id,
        email: user.email,
    }
}

fn media() -> MediaStorage {
    MediaStorage::new(std::env::temp_dir(), "/media/")
}

fn form(value: Value) -> Form {
    Form::from_data(serde_json::from_value(value).unwrap())
}

fn names(labels: &[Label]) -> Vec<&str> {
    labels.iter().map(|l| l.name.as_str()).collect()
}

async fn labels(store: &PgStore, user_id: Id, kind: LabelKind) -> Vec<Label> {
    let mut tx = store.begin().await.unwrap();
    tx.list_labels(kind, user_id).await.unwrap()
}

#[tokio::test]
async fn resolve_reuses_the_existing_row() {
    let Some(store) = connect().await else { return };
    let session = session(&store).await;

    let mut tx = store.begin().await.unwrap();
    let first = tx
        .resolve_label(LabelKind::Ingredient, session.user_id, "Salt")
        .await
        .unwrap();
    let again = tx
        .resolve_label(LabelKind::Ingredient, session.user_id, "Salt")
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(first, again);

    let mut tx = store.begin().await.unwrap();
    let later = tx
        .resolve_label(LabelKind::Ingredient, session.user_id, "Salt")
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(first, later);

    assert_eq!(labels(&store, session.user_id, LabelKind::Ingredient).await.len(), 1);
}

#[tokio::test]
async fn uncommitted_resolve_leaves_nothing() {
    let Some(store) = connect().await else { return };
    let session = session(&store).await;

    let mut tx = store.begin().await.unwrap();
    tx.resolve_label(LabelKind::Tag, session.user_id, "Draft")
        .await
        .unwrap();
    drop(tx);

    assert!(labels(&store, session.user_id, LabelKind::Tag).await.is_empty());
}

#[tokio::test]
async fn concurrent_resolves_share_one_row() {
    let Some(store) = connect().await else { return };
    let session = session(&store).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let user_id = session.user_id;
            tokio::spawn(async move {
                let mut tx = store.begin().await?;
                let label = tx.resolve_label(LabelKind::Tag, user_id, "Quick").await?;
                tx.commit().await?;
                Ok::<_, recipe_api::error::QueryError>(label.id)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(labels(&store, session.user_id, LabelKind::Tag).await.len(), 1);
}

#[tokio::test]
async fn opposite_name_orders_do_not_conflict() {
    let Some(store) = connect().await else { return };
    let session = session(&store).await;

    for round in 0..25 {
        let a = format!("a{round}");
        let b = format!("b{round}");

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                let session = session.clone();
                let tags = if i % 2 == 0 {
                    json!([{"name": a}, {"name": b}])
                } else {
                    json!([{"name": b}, {"name": a}])
                };
                tokio::spawn(async move {
                    let draft = RecipeDraft::from_form(&form(json!({
                        "title": format!("Recipe {round}.{i}"),
                        "time_minutes": 5,
                        "price": "1.00",
                        "tags": tags,
                    })))
                    .unwrap();
                    create_recipe(store.as_ref(), &media(), &session, draft).await
                })
            })
            .collect();

        let mut tag_sets = Vec::new();
        for task in tasks {
            let detail = task.await.unwrap().unwrap();
            let mut ids: Vec<Id> = detail.summary.tags.iter().map(|t| t.id).collect();
            ids.sort_unstable();
            tag_sets.push(ids);
        }

        assert!(tag_sets.iter().all(|ids| ids.len() == 2 && *ids == tag_sets[0]));
    }

    assert_eq!(labels(&store, session.user_id, LabelKind::Tag).await.len(), 50);
}

#[tokio::test]
async fn update_replaces_and_clears_links() {
    let Some(store) = connect().await else { return };
    let session = session(&store).await;

    let draft = RecipeDraft::from_form(&form(json!({
        "title": "Salad",
        "time_minutes": 10,
        "price": "3.00",
        "tags": [{"name": "Fresh"}],
        "ingredients": [{"name": "Lettuce"}, {"name": "Oil"}, {"name": "Tomato"}],
    })))
    .unwrap();
    let created = create_recipe(store.as_ref(), &media(), &session, draft)
        .await
        .unwrap();
    let id = created.summary.id;

    let patch = RecipePatch::from_form(
        &form(json!({"ingredients": [{"name": "Tomato"}, {"name": "Basil"}]})),
        true,
    )
    .unwrap();
    let replaced = update_recipe(store.as_ref(), &media(), &session, id, patch)
        .await
        .unwrap();
    assert_eq!(names(&replaced.summary.ingredients), vec!["Tomato", "Basil"]);
    assert_eq!(names(&replaced.summary.tags), vec!["Fresh"]);

    let patch = RecipePatch::from_form(&form(json!({"ingredients": []})), true).unwrap();
    let cleared = update_recipe(store.as_ref(), &media(), &session, id, patch)
        .await
        .unwrap();
    assert!(cleared.summary.ingredients.is_empty());
    assert_eq!(names(&cleared.summary.tags), vec!["Fresh"]);

    assert_eq!(
        labels(&store, session.user_id, LabelKind::Ingredient).await.len(),
        4
    );
}

#[tokio::test]
async fn scalar_update_keeps_links() {
    let Some(store) = connect().await else { return };
    let session = session(&store).await;

    let draft = RecipeDraft::from_form(&form(json!({
        "title": "Soup",
        "time_minutes": 30,
        "price": "4.50",
        "ingredients": [{"name": "Water"}],
    })))
    .unwrap();
    let created = create_recipe(store.as_ref(), &media(), &session, draft)
        .await
        .unwrap();

    let patch = RecipePatch::from_form(&form(json!({"title": "Broth", "price": 5})), true).unwrap();
    let updated = update_recipe(store.as_ref(), &media(), &session, created.summary.id, patch)
        .await
        .unwrap();

    assert_eq!(updated.summary.title, "Broth");
    assert_eq!(updated.summary.price.cents(), 500);
    assert_eq!(names(&updated.summary.ingredients), vec!["Water"]);
}
