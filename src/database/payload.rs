use super::{
    error::{TypeError, ValidationErrors},
    form::Form,
    schema::{LabelKind, NewRecipe, Price, RecipeChanges},
};
use crate::constants::{
    MAX_EMAIL_LENGTH, MAX_LINK_LENGTH, MAX_NAME_LENGTH, PASSWORD_MIN_LENGTH, REQUIRED, URL_SCHEMES,
};

fn max_length(value: String, limit: usize) -> Result<String, TypeError> {
    if value.chars().count() > limit {
        return Err(TypeError::new(&format!(
            "Ensure this field has no more than {limit} characters."
        )));
    }
    Ok(value)
}

fn required<T>(errors: &mut ValidationErrors, field: &str, value: Option<Option<T>>) -> Option<T> {
    match value {
        Some(Some(value)) => Some(value),
        Some(None) => {
            errors.add(field, REQUIRED);
            None
        }
        None => None,
    }
}

fn name_field(form: &Form, key: &str) -> Result<Option<String>, TypeError> {
    form.get_str(key)?
        .map(|v| max_length(v, MAX_NAME_LENGTH))
        .transpose()
}

fn link_field(form: &Form) -> Result<Option<Option<String>>, TypeError> {
    match form.get_nullable_str("link")? {
        Some(Some(link)) if !link.is_empty() => {
            let link = max_length(link, MAX_LINK_LENGTH)?;
            if !is_valid_url(&link) {
                return Err(TypeError::new("Enter a valid URL."));
            }
            Ok(Some(Some(link)))
        }
        other => Ok(other),
    }
}

pub fn is_valid_url(value: &str) -> bool {
    let Some(rest) = URL_SCHEMES.iter().find_map(|scheme| {
        value
            .get(..scheme.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .map(|_| &value[scheme.len()..])
    }) else {
        return false;
    };

    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = host.rsplit('@').next().unwrap_or("");
    let host = match host.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host,
    };

    !host.is_empty()
        && !value.chars().any(char::is_whitespace)
        && (host == "localhost" || host.contains('.'))
        && !host.starts_with('.')
        && !host.ends_with('.')
}

pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.rsplit_once('@') else {
        return false;
    };

    !local.is_empty()
        && !value.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}

/// Lowercases the domain part, leaving the local part as given.
pub fn normalize_email(value: &str) -> String {
    match value.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => value.to_string(),
    }
}

/// Names of the nested `{name}` descriptors under `kind.field()`. `None` when
/// the key is absent.
fn label_names(form: &Form, kind: LabelKind, errors: &mut ValidationErrors) -> Option<Vec<String>> {
    let field = kind.field();
    let items = errors.check(field, form.get_list(field))??;

    let mut names = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("{field}.{i}.name");
        match errors.check(&path, name_field(item, "name")) {
            Some(Some(name)) => names.push(name),
            Some(None) => errors.add(&path, REQUIRED),
            None => {}
        }
    }

    Some(names)
}

/// Body of a recipe create request.
#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub recipe: NewRecipe,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
}

impl RecipeDraft {
    pub fn from_form(form: &Form) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = errors.check("title", name_field(form, "title"));
        let title = required(&mut errors, "title", title);
        let time_minutes = errors.check("time_minutes", form.get_integer::<i32>("time_minutes"));
        let time_minutes = required(&mut errors, "time_minutes", time_minutes);
        let price = errors.check("price", form.get_number::<Price>("price"));
        let price = required(&mut errors, "price", price);
        let description = errors.check("description", form.get_nullable_str("description"));
        let link = errors.check("link", link_field(form));
        let tags = label_names(form, LabelKind::Tag, &mut errors);
        let ingredients = label_names(form, LabelKind::Ingredient, &mut errors);

        errors.into_result()?;

        match (title, time_minutes, price) {
            (Some(title), Some(time_minutes), Some(price)) => Ok(Self {
                recipe: NewRecipe {
                    title,
                    time_minutes,
                    price,
                    description: description.flatten().flatten(),
                    link: link.flatten().flatten(),
                },
                tags: tags.unwrap_or_default(),
                ingredients: ingredients.unwrap_or_default(),
            }),
            _ => Err(ValidationErrors::single("non_field_errors", REQUIRED)),
        }
    }
}

/// Body of a recipe update. Collections left as `None` keep their links.
#[derive(Debug, Clone, Default)]
pub struct RecipePatch {
    pub changes: RecipeChanges,
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

impl RecipePatch {
    /// With `partial` unset (a `PUT`), the required scalar fields must be present.
    pub fn from_form(form: &Form, partial: bool) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = errors.check("title", name_field(form, "title")).flatten();
        let time_minutes = errors
            .check("time_minutes", form.get_integer::<i32>("time_minutes"))
            .flatten();
        let price = errors.check("price", form.get_number::<Price>("price")).flatten();
        let description = errors
            .check("description", form.get_nullable_str("description"))
            .flatten();
        let link = errors.check("link", link_field(form)).flatten();
        let tags = label_names(form, LabelKind::Tag, &mut errors);
        let ingredients = label_names(form, LabelKind::Ingredient, &mut errors);

        if !partial {
            for key in ["title", "time_minutes", "price"] {
                if !form.has(key) {
                    errors.add(key, REQUIRED);
                }
            }
        }

        errors.into_result()?;

        Ok(Self {
            changes: RecipeChanges {
                title,
                time_minutes,
                price,
                description,
                link,
            },
            tags,
            ingredients,
        })
    }

    pub fn labels(&self, kind: LabelKind) -> Option<&[String]> {
        match kind {
            LabelKind::Tag => self.tags.as_deref(),
            LabelKind::Ingredient => self.ingredients.as_deref(),
        }
    }
}

/// Body of a tag/ingredient update. The name is required on both `PUT` and
/// `PATCH`.
pub fn label_rename(form: &Form) -> Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = errors.check("name", name_field(form, "name"));

    match required(&mut errors, "name", name) {
        Some(name) if errors.is_empty() => Ok(name),
        _ => Err(errors),
    }
}

fn email_field(form: &Form) -> Result<Option<String>, TypeError> {
    match form.get_str("email")? {
        Some(email) => {
            let email = max_length(email, MAX_EMAIL_LENGTH)?;
            if !is_valid_email(&email) {
                return Err(TypeError::new("Enter a valid email address."));
            }
            Ok(Some(normalize_email(&email)))
        }
        None => Ok(None),
    }
}

fn password_field(form: &Form) -> Result<Option<String>, TypeError> {
    match form.get_raw_str("password")? {
        Some(password) if password.chars().count() < PASSWORD_MIN_LENGTH => Err(TypeError::new(
            &format!("Ensure this field has at least {PASSWORD_MIN_LENGTH} characters."),
        )),
        other => Ok(other),
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl Registration {
    pub fn from_form(form: &Form) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let email = errors.check("email", email_field(form));
        let email = required(&mut errors, "email", email);
        let password = errors.check("password", password_field(form));
        let password = required(&mut errors, "password", password);
        let name = errors.check("name", name_field(form, "name"));
        let name = required(&mut errors, "name", name);

        match (email, password, name) {
            (Some(email), Some(password), Some(name)) if errors.is_empty() => Ok(Self {
                email,
                password,
                name,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn from_form(form: &Form) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let email = errors.check("email", email_field(form));
        let email = required(&mut errors, "email", email);
        let password = errors.check("password", form.get_raw_str("password"));
        let password = required(&mut errors, "password", password);

        match (email, password) {
            (Some(email), Some(password)) if errors.is_empty() => Ok(Self { email, password }),
            _ => Err(errors),
        }
    }
}

/// Self-service profile update. The password is still plaintext here.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

impl ProfileChanges {
    pub fn from_form(form: &Form, partial: bool) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let email = errors.check("email", email_field(form)).flatten();
        let name = errors.check("name", name_field(form, "name")).flatten();
        let password = errors.check("password", password_field(form)).flatten();

        if !partial {
            for key in ["email", "name"] {
                if !form.has(key) {
                    errors.add(key, REQUIRED);
                }
            }
        }

        errors.into_result()?;

        Ok(Self {
            email,
            name,
            password,
        })
    }
}
