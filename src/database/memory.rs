use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    error::{QueryError, QueryErrorKind},
    repository::{LabelRepository, RecipeRepository, Store, UnitOfWork, UserRepository},
    schema::{
        Id, Label, LabelKind, LinkedLabel, NewRecipe, NewUser, Recipe, RecipeChanges, User,
        UserChanges,
    },
};

#[derive(Debug, Clone)]
struct Table<T> {
    last_id: Id,
    rows: BTreeMap<Id, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            last_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Clone, Default)]
struct LabelTable {
    rows: Table<Label>,
    // (recipe_id, label_id)
    links: BTreeSet<(Id, Id)>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Table<User>,
    recipes: Table<Recipe>,
    labels: HashMap<LabelKind, LabelTable>,
}

impl MemoryState {
    fn labels(&mut self, kind: LabelKind) -> &mut LabelTable {
        self.labels.entry(kind).or_default()
    }

    fn unlink_recipe(&mut self, recipe_id: Id) {
        for table in self.labels.values_mut() {
            table.links.retain(|(r, _)| *r != recipe_id);
        }
    }
}

/// In-process backend. A unit of work holds the store lock for its whole
/// lifetime and edits a private copy, so transactions are serializable and an
/// abandoned one leaves no trace.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, QueryError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn unique_violation(info: &str) -> QueryError {
    QueryError::new(QueryErrorKind::UniqueViolation, info.to_string())
}

#[async_trait]
impl UnitOfWork for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;

        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryTransaction {
    async fn insert_user(&mut self, user: NewUser) -> Result<User, QueryError> {
        let users = &mut self.working.users;
        if users.rows.values().any(|u| u.email == user.email) {
            return Err(unique_violation("users_email_key"));
        }

        let id = users.next_id();
        let row = User {
            id,
            email: user.email,
            password: user.password,
            name: user.name,
            is_active: true,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        };
        users.rows.insert(id, row.clone());

        Ok(row)
    }

    async fn get_user_by_id(&mut self, id: Id) -> Result<Option<User>, QueryError> {
        Ok(self.working.users.rows.get(&id).cloned())
    }

    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, QueryError> {
        Ok(self
            .working
            .users
            .rows
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_user(
        &mut self,
        id: Id,
        changes: UserChanges,
    ) -> Result<Option<User>, QueryError> {
        let users = &mut self.working.users;
        if let Some(email) = &changes.email {
            if users.rows.values().any(|u| u.id != id && &u.email == email) {
                return Err(unique_violation("users_email_key"));
            }
        }

        let Some(user) = users.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(password) = changes.password {
            user.password = password;
        }

        Ok(Some(user.clone()))
    }

    async fn delete_user(&mut self, id: Id) -> Result<bool, QueryError> {
        if self.working.users.rows.remove(&id).is_none() {
            return Ok(false);
        }

        let owned: Vec<Id> = self
            .working
            .recipes
            .rows
            .values()
            .filter(|r| r.user_id == id)
            .map(|r| r.id)
            .collect();
        for recipe_id in owned {
            self.working.recipes.rows.remove(&recipe_id);
            self.working.unlink_recipe(recipe_id);
        }

        for table in self.working.labels.values_mut() {
            let removed: BTreeSet<Id> = table
                .rows
                .rows
                .values()
                .filter(|l| l.user_id == id)
                .map(|l| l.id)
                .collect();
            table.rows.rows.retain(|label_id, _| !removed.contains(label_id));
            table.links.retain(|(_, label_id)| !removed.contains(label_id));
        }

        Ok(true)
    }
}

#[async_trait]
impl LabelRepository for MemoryTransaction {
    async fn resolve_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        name: &str,
    ) -> Result<Label, QueryError> {
        let table = self.working.labels(kind);
        if let Some(existing) = table
            .rows
            .rows
            .values()
            .find(|l| l.user_id == user_id && l.name == name)
        {
            return Ok(existing.clone());
        }

        let id = table.rows.next_id();
        let label = Label {
            id,
            user_id,
            name: name.to_string(),
        };
        table.rows.rows.insert(id, label.clone());
        log::trace!("> Created {} {id} for user {user_id}", kind.verbose_name());

        Ok(label)
    }

    async fn list_labels(
        &mut self,
        kind: LabelKind,
        user_id: Id,
    ) -> Result<Vec<Label>, QueryError> {
        let mut rows: Vec<Label> = self
            .working
            .labels(kind)
            .rows
            .rows
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.name.cmp(&a.name));

        Ok(rows)
    }

    async fn get_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        id: Id,
    ) -> Result<Option<Label>, QueryError> {
        Ok(self
            .working
            .labels(kind)
            .rows
            .rows
            .get(&id)
            .filter(|l| l.user_id == user_id)
            .cloned())
    }

    async fn rename_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        id: Id,
        name: &str,
    ) -> Result<Option<Label>, QueryError> {
        let table = &mut self.working.labels(kind).rows.rows;
        if table
            .values()
            .any(|l| l.id != id && l.user_id == user_id && l.name == name)
        {
            return Err(unique_violation(kind.table()));
        }

        match table.get_mut(&id).filter(|l| l.user_id == user_id) {
            Some(label) => {
                label.name = name.to_string();
                Ok(Some(label.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_label(
        &mut self,
        kind: LabelKind,
        user_id: Id,
        id: Id,
    ) -> Result<bool, QueryError> {
        let table = self.working.labels(kind);
        let owned = table
            .rows
            .rows
            .get(&id)
            .is_some_and(|l| l.user_id == user_id);
        if !owned {
            return Ok(false);
        }

        table.rows.rows.remove(&id);
        table.links.retain(|(_, label_id)| *label_id != id);

        Ok(true)
    }

    async fn list_linked_labels(
        &mut self,
        kind: LabelKind,
        recipe_ids: &[Id],
    ) -> Result<Vec<LinkedLabel>, QueryError> {
        let table = self.working.labels(kind);
        let mut linked: Vec<LinkedLabel> = table
            .links
            .iter()
            .filter(|(recipe_id, _)| recipe_ids.contains(recipe_id))
            .filter_map(|(recipe_id, label_id)| {
                table.rows.rows.get(label_id).map(|label| LinkedLabel {
                    recipe_id: *recipe_id,
                    id: label.id,
                    user_id: label.user_id,
                    name: label.name.to_owned(),
                })
            })
            .collect();
        linked.sort_by_key(|l| l.id);

        Ok(linked)
    }

    async fn set_recipe_labels(
        &mut self,
        kind: LabelKind,
        recipe_id: Id,
        label_ids: &[Id],
    ) -> Result<(), QueryError> {
        let table = self.working.labels(kind);
        table.links.retain(|(r, _)| *r != recipe_id);
        table
            .links
            .extend(label_ids.iter().map(|label_id| (recipe_id, *label_id)));

        Ok(())
    }
}

#[async_trait]
impl RecipeRepository for MemoryTransaction {
    async fn insert_recipe(
        &mut self,
        user_id: Id,
        recipe: NewRecipe,
    ) -> Result<Recipe, QueryError> {
        let recipes = &mut self.working.recipes;
        let id = recipes.next_id();
        let row = Recipe {
            id,
            user_id,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            description: recipe.description,
            link: recipe.link,
            image: None,
        };
        recipes.rows.insert(id, row.clone());

        Ok(row)
    }

    async fn get_recipe(&mut self, user_id: Id, id: Id) -> Result<Option<Recipe>, QueryError> {
        Ok(self
            .working
            .recipes
            .rows
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn list_recipes(&mut self, user_id: Id) -> Result<Vec<Recipe>, QueryError> {
        Ok(self
            .working
            .recipes
            .rows
            .values()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_recipe(
        &mut self,
        user_id: Id,
        id: Id,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, QueryError> {
        let Some(recipe) = self
            .working
            .recipes
            .rows
            .get_mut(&id)
            .filter(|r| r.user_id == user_id)
        else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            recipe.title = title;
        }
        if let Some(time_minutes) = changes.time_minutes {
            recipe.time_minutes = time_minutes;
        }
        if let Some(price) = changes.price {
            recipe.price = price;
        }
        if let Some(description) = changes.description {
            recipe.description = description;
        }
        if let Some(link) = changes.link {
            recipe.link = link;
        }

        Ok(Some(recipe.clone()))
    }

    async fn set_recipe_image(
        &mut self,
        user_id: Id,
        id: Id,
        image: Option<String>,
    ) -> Result<Option<Recipe>, QueryError> {
        match self
            .working
            .recipes
            .rows
            .get_mut(&id)
            .filter(|r| r.user_id == user_id)
        {
            Some(recipe) => {
                recipe.image = image;
                Ok(Some(recipe.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_recipe(&mut self, user_id: Id, id: Id) -> Result<bool, QueryError> {
        let owned = self
            .working
            .recipes
            .rows
            .get(&id)
            .is_some_and(|r| r.user_id == user_id);
        if !owned {
            return Ok(false);
        }

        self.working.recipes.rows.remove(&id);
        self.working.unlink_recipe(id);

        Ok(true)
    }
}
