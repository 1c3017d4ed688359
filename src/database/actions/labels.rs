use crate::{
    actions::authorize,
    error::ApiError,
    jwt::SessionData,
    repository::Store,
    schema::{Id, Label, LabelKind},
};

pub async fn list_labels(
    store: &dyn Store,
    session: &SessionData,
    kind: LabelKind,
) -> Result<Vec<Label>, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;
    let labels = tx.list_labels(kind, user.id).await?;

    Ok(labels)
}

pub async fn get_label(
    store: &dyn Store,
    session: &SessionData,
    kind: LabelKind,
    id: Id,
) -> Result<Label, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    tx.get_label(kind, user.id, id)
        .await?
        .ok_or(ApiError::NotFound)
}

/// Renames one of the caller's labels. A name already used by another of
/// their labels of the same kind is a validation error.
pub async fn rename_label(
    store: &dyn Store,
    session: &SessionData,
    kind: LabelKind,
    id: Id,
    name: &str,
) -> Result<Label, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    let label = tx
        .rename_label(kind, user.id, id, name)
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ApiError::invalid(
                    "name",
                    &format!("{} with this name already exists.", kind.verbose_name()),
                )
            } else {
                e.into()
            }
        })?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    Ok(label)
}

/// Deleting a label only unlinks it from recipes; the recipes stay.
pub async fn delete_label(
    store: &dyn Store,
    session: &SessionData,
    kind: LabelKind,
    id: Id,
) -> Result<(), ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    if !tx.delete_label(kind, user.id, id).await? {
        return Err(ApiError::NotFound);
    }
    tx.commit().await?;
    log::debug!("Deleted {} {id} of user {}", kind.verbose_name(), user.id);

    Ok(())
}
