use std::collections::HashMap;

use crate::{
    actions::authorize,
    constants::MAX_IMAGE_PATH_LENGTH,
    error::{ApiError, QueryError},
    jwt::SessionData,
    media::{is_image, recipe_image_path, ImageUpload, MediaStorage},
    payload::{RecipeDraft, RecipePatch},
    repository::{Store, UnitOfWork},
    schema::{Id, Label, LabelKind, Recipe, RecipeDetail, RecipeImage, RecipeSummary},
};

const LABEL_KINDS: [LabelKind; 2] = [LabelKind::Tag, LabelKind::Ingredient];

/// Resolves every name to the caller's label, creating missing ones. Names are
/// resolved in sorted order so concurrent writers take the unique index locks
/// in the same sequence. Repeated names collapse onto one id.
async fn resolve_labels(
    tx: &mut dyn UnitOfWork,
    kind: LabelKind,
    user_id: Id,
    names: &[String],
) -> Result<Vec<Id>, QueryError> {
    let mut names: Vec<&str> = names.iter().map(String::as_str).collect();
    names.sort_unstable();
    names.dedup();

    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        ids.push(tx.resolve_label(kind, user_id, name).await?.id);
    }

    Ok(ids)
}

async fn replace_labels(
    tx: &mut dyn UnitOfWork,
    kind: LabelKind,
    user_id: Id,
    recipe_id: Id,
    names: &[String],
) -> Result<(), QueryError> {
    let ids = resolve_labels(tx, kind, user_id, names).await?;
    tx.set_recipe_labels(kind, recipe_id, &ids).await?;
    log::trace!(
        "> Linked {} {}(s) to recipe {recipe_id}",
        ids.len(),
        kind.verbose_name()
    );

    Ok(())
}

#[derive(Default)]
struct LinkedLabels {
    by_recipe: HashMap<(LabelKind, Id), Vec<Label>>,
}

impl LinkedLabels {
    async fn load(tx: &mut dyn UnitOfWork, recipe_ids: &[Id]) -> Result<Self, QueryError> {
        let mut labels = Self::default();
        if recipe_ids.is_empty() {
            return Ok(labels);
        }

        for kind in LABEL_KINDS {
            for linked in tx.list_linked_labels(kind, recipe_ids).await? {
                labels
                    .by_recipe
                    .entry((kind, linked.recipe_id))
                    .or_default()
                    .push(linked.into());
            }
        }

        Ok(labels)
    }

    fn take(&mut self, kind: LabelKind, recipe_id: Id) -> Vec<Label> {
        self.by_recipe.remove(&(kind, recipe_id)).unwrap_or_default()
    }

    fn summary(&mut self, recipe: &Recipe) -> RecipeSummary {
        RecipeSummary {
            id: recipe.id,
            title: recipe.title.to_owned(),
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            link: recipe.link.to_owned(),
            tags: self.take(LabelKind::Tag, recipe.id),
            ingredients: self.take(LabelKind::Ingredient, recipe.id),
        }
    }
}

async fn load_detail(
    tx: &mut dyn UnitOfWork,
    media: &MediaStorage,
    recipe: Recipe,
) -> Result<RecipeDetail, QueryError> {
    let mut labels = LinkedLabels::load(tx, &[recipe.id]).await?;

    Ok(RecipeDetail {
        summary: labels.summary(&recipe),
        description: recipe.description,
        image: recipe.image.map(|path| media.url(&path)),
    })
}

pub async fn list_recipes(
    store: &dyn Store,
    session: &SessionData,
) -> Result<Vec<RecipeSummary>, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    let recipes = tx.list_recipes(user.id).await?;
    let ids: Vec<Id> = recipes.iter().map(|r| r.id).collect();
    let mut labels = LinkedLabels::load(tx.as_mut(), &ids).await?;

    Ok(recipes.iter().map(|r| labels.summary(r)).collect())
}

pub async fn get_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    id: Id,
) -> Result<RecipeDetail, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    let recipe = tx.get_recipe(user.id, id).await?.ok_or(ApiError::NotFound)?;

    Ok(load_detail(tx.as_mut(), media, recipe).await?)
}

/// Persists the recipe and links it to the caller's tags and ingredients,
/// creating the labels that don't exist yet. All of it commits or none of it.
pub async fn create_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    draft: RecipeDraft,
) -> Result<RecipeDetail, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    let recipe = tx.insert_recipe(user.id, draft.recipe).await?;
    replace_labels(tx.as_mut(), LabelKind::Tag, user.id, recipe.id, &draft.tags).await?;
    replace_labels(
        tx.as_mut(),
        LabelKind::Ingredient,
        user.id,
        recipe.id,
        &draft.ingredients,
    )
    .await?;

    let detail = load_detail(tx.as_mut(), media, recipe).await?;
    tx.commit().await?;
    log::info!("User {} created recipe {}", user.id, detail.summary.id);

    Ok(detail)
}

/// Replaces each supplied collection with exactly the named labels and applies
/// the scalar changes. Omitted collections keep their links.
pub async fn update_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    id: Id,
    patch: RecipePatch,
) -> Result<RecipeDetail, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    let mut recipe = tx.get_recipe(user.id, id).await?.ok_or(ApiError::NotFound)?;

    for kind in LABEL_KINDS {
        if let Some(names) = patch.labels(kind) {
            replace_labels(tx.as_mut(), kind, user.id, recipe.id, names).await?;
        }
    }

    if !patch.changes.is_empty() {
        recipe = tx
            .update_recipe(user.id, id, patch.changes)
            .await?
            .ok_or(ApiError::NotFound)?;
    }

    let detail = load_detail(tx.as_mut(), media, recipe).await?;
    tx.commit().await?;

    Ok(detail)
}

pub async fn delete_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    id: Id,
) -> Result<(), ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    let recipe = tx.get_recipe(user.id, id).await?.ok_or(ApiError::NotFound)?;
    tx.delete_recipe(user.id, id).await?;
    tx.commit().await?;

    if let Some(image) = recipe.image {
        if let Err(e) = media.remove(&image).await {
            log::warn!("Failed to remove image {image} of deleted recipe {id}: {e}");
        }
    }

    Ok(())
}

/// Stores the upload under a fresh path and points the recipe at it. The
/// previous file is removed only once the new reference is committed.
pub async fn upload_image(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    id: Id,
    upload: Option<ImageUpload>,
) -> Result<RecipeImage, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    let recipe = tx.get_recipe(user.id, id).await?.ok_or(ApiError::NotFound)?;

    let upload = upload.ok_or_else(|| ApiError::invalid("image", "No file was submitted."))?;
    if upload.data.is_empty() {
        return Err(ApiError::invalid("image", "The submitted file is empty."));
    }
    if !is_image(&upload.data) {
        return Err(ApiError::invalid(
            "image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        ));
    }

    let path = recipe_image_path(&upload.filename);
    let length = path.chars().count();
    if length > MAX_IMAGE_PATH_LENGTH {
        return Err(ApiError::invalid(
            "image",
            &format!(
                "Ensure this filename has at most {MAX_IMAGE_PATH_LENGTH} characters (it has {length})."
            ),
        ));
    }
    media.save(&path, &upload.data).await?;

    let stored = match tx.set_recipe_image(user.id, id, Some(path.to_owned())).await {
        Ok(Some(_)) => tx.commit().await.map_err(ApiError::from),
        Ok(None) => Err(ApiError::NotFound),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = stored {
        if let Err(remove) = media.remove(&path).await {
            log::warn!("Failed to remove orphaned upload {path}: {remove}");
        }
        return Err(e);
    }

    if let Some(previous) = recipe.image.filter(|previous| previous != &path) {
        if let Err(e) = media.remove(&previous).await {
            log::warn!("Failed to remove replaced image {previous}: {e}");
        }
    }
    log::info!("Stored image {path} for recipe {id}");

    Ok(RecipeImage {
        id,
        image: Some(media.url(&path)),
    })
}
