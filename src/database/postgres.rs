use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, QueryBuilder, Transaction};

use super::{
    error::QueryError,
    repository::{LabelRepository, RecipeRepository, Store, UnitOfWork, UserRepository},
    schema::{
        Id, Label, LabelKind, LinkedLabel, NewRecipe, NewUser, Recipe, RecipeChanges, User,
        UserChanges,
    },
};

const USER_COLUMNS: &str = "id, email, password, name, is_active, is_staff, is_superuser";
const RESOLVE_ATTEMPTS: usize = 3;
const RECIPE_COLUMNS: &str = "id, user_id, title, time_minutes, price, description, link, image";

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Connects, retrying once per second until the database accepts
    /// connections or `attempts` runs out.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        attempts: u32,
    ) -> Result<Self, QueryError> {
        let mut attempt = 1;
        loop {
            let result = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await;

            match result {
                Ok(pool) => {
                    log::info!("Database available");
                    return Ok(Self::from_pool(pool));
                }
                Err(e) if attempt < attempts => {
                    log::warn!("Database not available ({e}), waiting 1 second [{attempt}/{attempts}]");
                    attempt += 1;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn migrate(&self) -> Result<(), QueryError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| QueryError::from(sqlx::Error::from(e)))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, QueryError> {
        let tx = self.pool.begin().await?;

        Ok(Box::new(PgTransaction { tx }))
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgTransaction {
    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        self.tx.commit().await?;

        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgTransaction {
    async fn insert_user(&mut self, user: NewUser) -> Result<User, QueryError> {
        let row: User = sqlx::query_as(&format!(
            "
            INSERT INTO users (email, password, name, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
        "
        ))
        .bind(user.email)
        .bind(user.password)
        .bind(user.name)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn get_user_by_id(&mut self, id: Id) -> Result<Option<User>, QueryError> {
        let row: Option<User> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row)
    }

    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, QueryError> {
        let row: Option<User> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row)
    }

    async fn update_user(
        &mut self,
        id: Id,
        changes: UserChanges,
    ) -> Result<Option<User>, QueryError> {
        let row: Option<User> = sqlx::query_as(&format!(
            "
            UPDATE users SET
            email = COALESCE($2, email),
            name = COALESCE($3, name),
            password = COALESCE($4, password)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
        "
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.name)
        .bind(changes.password)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn delete_user(&mut self, id: Id) -> Result<bool, QueryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LabelRepository for PgTransaction {
    async fn resolve_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        name: &str,
    ) -> Result<Label, QueryError> {
        let table = kind.table();

        // A concurrent insert of the same pair makes the insert a no-op and the
        // select then sees the committed row. The row can vanish in between if
        // another request deletes it, so the pair is tried again.
        for _ in 0..RESOLVE_ATTEMPTS {
            let created: Option<Label> = sqlx::query_as(&format!(
                "
                INSERT INTO {table} (user_id, name) VALUES ($1, $2)
                ON CONFLICT (user_id, name) DO NOTHING
                RETURNING id, user_id, name
            "
            ))
            .bind(user_id)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;

            if let Some(label) = created {
                log::trace!("> Created {} {} for user {user_id}", kind.verbose_name(), label.id);
                return Ok(label);
            }

            let existing: Option<Label> = sqlx::query_as(&format!(
                "SELECT id, user_id, name FROM {table} WHERE user_id = $1 AND name = $2"
            ))
            .bind(user_id)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;

            if let Some(label) = existing {
                return Ok(label);
            }
        }

        Err(sqlx::Error::RowNotFound.into())
    }

    async fn list_labels(
        &mut self,
        kind: LabelKind,
        user_id: Id,
    ) -> Result<Vec<Label>, QueryError> {
        let rows: Vec<Label> = sqlx::query_as(&format!(
            "SELECT id, user_id, name FROM {} WHERE user_id = $1 ORDER BY name DESC",
            kind.table()
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows)
    }

    async fn get_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        id: Id,
    ) -> Result<Option<Label>, QueryError> {
        let row: Option<Label> = sqlx::query_as(&format!(
            "SELECT id, user_id, name FROM {} WHERE id = $1 AND user_id = $2",
            kind.table()
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn rename_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        id: Id,
        name: &str,
    ) -> Result<Option<Label>, QueryError> {
        let row: Option<Label> = sqlx::query_as(&format!(
            "UPDATE {} SET name = $3 WHERE id = $1 AND user_id = $2 RETURNING id, user_id, name",
            kind.table()
        ))
        .bind(id)
        .bind(user_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn delete_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        id: Id,
    ) -> Result<bool, QueryError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND user_id = $2",
            kind.table()
        ))
        .bind(id)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_linked_labels(
        &mut self,
        kind: LabelKind,
        recipe_ids: &[Id],
    ) -> Result<Vec<LinkedLabel>, QueryError> {
        let rows: Vec<LinkedLabel> = sqlx::query_as(&format!(
            "
            SELECT m.recipe_id AS recipe_id, l.id AS id, l.user_id AS user_id, l.name AS name
            FROM {link} m
            INNER JOIN {table} l ON l.id = m.{column}
            WHERE m.recipe_id = ANY($1)
            ORDER BY l.id
        ",
            link = kind.link_table(),
            table = kind.table(),
            column = kind.link_column(),
        ))
        .bind(recipe_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows)
    }

    async fn set_recipe_labels(
        &mut self,
        kind: LabelKind,
        recipe_id: Id,
        label_ids: &[Id],
    ) -> Result<(), QueryError> {
        let link = kind.link_table();
        let column = kind.link_column();

        sqlx::query(&format!("DELETE FROM {link} WHERE recipe_id = $1"))
            .bind(recipe_id)
            .execute(&mut *self.tx)
            .await?;

        if label_ids.is_empty() {
            return Ok(());
        }

        sqlx::query(&format!(
            "
            INSERT INTO {link} (recipe_id, {column})
            SELECT $1, UNNEST($2::int4[])
            ON CONFLICT DO NOTHING
        "
        ))
        .bind(recipe_id)
        .bind(label_ids)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RecipeRepository for PgTransaction {
    async fn insert_recipe(
        &mut self,
        user_id: Id,
        recipe: NewRecipe,
    ) -> Result<Recipe, QueryError> {
        let row: Recipe = sqlx::query_as(&format!(
            "
            INSERT INTO recipes (user_id, title, time_minutes, price, description, link)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {RECIPE_COLUMNS}
        "
        ))
        .bind(user_id)
        .bind(recipe.title)
        .bind(recipe.time_minutes)
        .bind(recipe.price)
        .bind(recipe.description)
        .bind(recipe.link)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn get_recipe(&mut self, user_id: Id, id: Id) -> Result<Option<Recipe>, QueryError> {
        let row: Option<Recipe> = sqlx::query_as(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn list_recipes(&mut self, user_id: Id) -> Result<Vec<Recipe>, QueryError> {
        let rows: Vec<Recipe> = sqlx::query_as(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE user_id = $1 ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows)
    }

    async fn update_recipe(
        &mut self,
        user_id: Id,
        id: Id,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, QueryError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE recipes SET id = id");

        if let Some(title) = changes.title {
            query.push(", title = ").push_bind(title);
        }
        if let Some(time_minutes) = changes.time_minutes {
            query.push(", time_minutes = ").push_bind(time_minutes);
        }
        if let Some(price) = changes.price {
            query.push(", price = ").push_bind(price);
        }
        if let Some(description) = changes.description {
            query.push(", description = ").push_bind(description);
        }
        if let Some(link) = changes.link {
            query.push(", link = ").push_bind(link);
        }

        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(user_id)
            .push(format!(" RETURNING {RECIPE_COLUMNS}"));

        let row: Option<Recipe> = query
            .build_query_as::<Recipe>()
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row)
    }

    async fn set_recipe_image(
        &mut self,
        user_id: Id,
        id: Id,
        image: Option<String>,
    ) -> Result<Option<Recipe>, QueryError> {
        let row: Option<Recipe> = sqlx::query_as(&format!(
            "UPDATE recipes SET image = $3 WHERE id = $1 AND user_id = $2 RETURNING {RECIPE_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(image)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn delete_recipe(&mut self, user_id: Id, id: Id) -> Result<bool, QueryError> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
