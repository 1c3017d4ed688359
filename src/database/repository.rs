use async_trait::async_trait;

use super::{
    error::QueryError,
    schema::{
        Id, Label, LabelKind, LinkedLabel, NewRecipe, NewUser, Recipe, RecipeChanges, User,
        UserChanges,
    },
};

#[async_trait]
pub trait UserRepository {
    async fn insert_user(&mut self, user: NewUser) -> Result<User, QueryError>;

    async fn get_user_by_id(&mut self, id: Id) -> Result<Option<User>, QueryError>;

    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, QueryError>;

    async fn update_user(&mut self, id: Id, changes: UserChanges)
        -> Result<Option<User>, QueryError>;

    /// Removes the user together with everything they own.
    async fn delete_user(&mut self, id: Id) -> Result<bool, QueryError>;
}

#[async_trait]
pub trait LabelRepository {
    /// Returns the `(user_id, name)` row, creating it first when absent.
    async fn resolve_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        name: &str,
    ) -> Result<Label, QueryError>;

    /// Ordered by descending name.
    async fn list_labels(&mut self, kind: LabelKind, user_id: Id)
        -> Result<Vec<Label>, QueryError>;

    async fn get_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        id: Id,
    ) -> Result<Option<Label>, QueryError>;

    async fn rename_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        id: Id,
        name: &str,
    ) -> Result<Option<Label>, QueryError>;

    async fn delete_label(&mut self, kind: LabelKind, user_id: Id, id: Id)
        -> Result<bool, QueryError>;

    /// Labels linked to any of `recipe_ids`, ordered by label id.
    async fn list_linked_labels(
        &mut self,
        kind: LabelKind,
        recipe_ids: &[Id],
    ) -> Result<Vec<LinkedLabel>, QueryError>;

    /// Replaces the recipe's association set with exactly `label_ids`.
    async fn set_recipe_labels(
        &mut self,
        kind: LabelKind,
        recipe_id: Id,
        label_ids: &[Id],
    ) -> Result<(), QueryError>;
}

#[async_trait]
pub trait RecipeRepository {
    async fn insert_recipe(&mut self, user_id: Id, recipe: NewRecipe)
        -> Result<Recipe, QueryError>;

    async fn get_recipe(&mut self, user_id: Id, id: Id) -> Result<Option<Recipe>, QueryError>;

    /// Ordered by descending id.
    async fn list_recipes(&mut self, user_id: Id) -> Result<Vec<Recipe>, QueryError>;

    async fn update_recipe(
        &mut self,
        user_id: Id,
        id: Id,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, QueryError>;

    async fn set_recipe_image(
        &mut self,
        user_id: Id,
        id: Id,
        image: Option<String>,
    ) -> Result<Option<Recipe>, QueryError>;

    async fn delete_recipe(&mut self, user_id: Id, id: Id) -> Result<bool, QueryError>;
}

/// One transaction. Dropping it without calling `commit` discards every change.
#[async_trait]
pub trait UnitOfWork: UserRepository + LabelRepository + RecipeRepository + Send {
    async fn commit(self: Box<Self>) -> Result<(), QueryError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, QueryError>;
}
