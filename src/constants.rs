pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_EMAIL_LENGTH: usize = 255;
pub const MAX_LINK_LENGTH: usize = 200;
pub const PASSWORD_MIN_LENGTH: usize = 5;

pub const PRICE_MAX_DIGITS: usize = 10;
pub const PRICE_DECIMAL_PLACES: usize = 2;

pub const RECIPE_IMAGE_DIR: &str = "uploads/recipes";
pub const RECIPE_IMAGE_FIELD: &str = "image";
pub const MAX_IMAGE_PATH_LENGTH: usize = 255;

pub const URL_SCHEMES: &[&str] = &["http://", "https://", "ftp://", "ftps://"];

pub const AUTHORIZATION_SCHEMES: &[&str] = &["Token", "Bearer"];

pub const REQUIRED: &str = "This field is required.";
pub const NOT_BLANK: &str = "This field may not be blank.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_FOUND: &str = "Not found.";
