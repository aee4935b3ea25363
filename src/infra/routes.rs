use mongodb::bson::oid::ObjectId;
use rocket::{delete, get, http::Status, patch, post, serde::json::Json, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

use super::config::AppConfig;
use super::mongo::{
    Difficulty, Ingredient, MongoRep, MongoRepError, NewUser, PagedRecipes, Pagination,
    PreferencesUpdate, Recipe, RecipeFilter, RecipeStats, RecipeUpdate, RecipeWire, UserUpdate,
    UserWire,
};

fn internal_error(error: MongoRepError) -> Status {
    error!(%error, "repository operation failed");
    Status::InternalServerError
}

/// Parses inbound difficulty values strictly, dropping unknown names. No
/// recognized value means no difficulty constraint.
fn difficulty_filter(values: &[String]) -> Option<RecipeFilter> {
    let parsed: Vec<Difficulty> = values
        .iter()
        .filter_map(|value| Difficulty::from_name(value))
        .collect();
    if parsed.is_empty() {
        None
    } else {
        Some(RecipeFilter::Difficulty(parsed))
    }
}

#[derive(Debug, Serialize)]
pub struct RecipePage {
    pub recipes: Vec<RecipeWire>,
    pub pagination: Pagination,
}

impl From<PagedRecipes> for RecipePage {
    fn from(paged: PagedRecipes) -> Self {
        RecipePage {
            recipes: paged.recipes.iter().map(RecipeWire::from).collect(),
            pagination: paged.pagination,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: RecipeWire,
    pub similar_recipes: Vec<RecipeWire>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl From<bool> for StatusResponse {
    fn from(success: bool) -> Self {
        StatusResponse {
            status: if success { "success" } else { "error" },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedRecipe {
    pub status: &'static str,
    pub recipe_id: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Inbound recipe payload. Ids arrive as strings on the wire and are
/// re-parsed here; an unparsable author id is dropped rather than refused.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeDraft {
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub preparation_time: i64,
    #[serde(default)]
    pub cooking_time: i64,
    #[serde(default)]
    pub nutritional_info: HashMap<String, f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl RecipeDraft {
    fn into_recipe(self) -> Recipe {
        let now = mongodb::bson::DateTime::now();
        Recipe {
            id: None,
            name: self.name,
            ingredients: self.ingredients,
            instructions: self.instructions,
            cuisine: self.cuisine,
            difficulty: self.difficulty,
            preparation_time: self.preparation_time,
            cooking_time: self.cooking_time,
            nutritional_info: self.nutritional_info,
            tags: self.tags,
            image_url: self.image_url,
            user_id: self
                .user_id
                .as_deref()
                .and_then(|id| ObjectId::parse_str(id).ok()),
            user_ratings: Vec::new(),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub user_id: String,
    pub rating: f64,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: UserWire,
    pub total_comments: u64,
}

#[allow(clippy::too_many_arguments)]
#[get("/recipes?<q>&<page>&<page_size>&<cuisine>&<difficulty>&<tag>&<preparation_time_max>&<cooking_time_max>")]
pub fn search_recipes(
    db: &State<MongoRep>,
    config: &State<AppConfig>,
    q: Option<String>,
    page: Option<u64>,
    page_size: Option<u64>,
    cuisine: Option<String>,
    difficulty: Vec<String>,
    tag: Vec<String>,
    preparation_time_max: Option<i64>,
    cooking_time_max: Option<i64>,
) -> Result<Json<RecipePage>, Status> {
    let mut filters = Vec::new();
    if let Some(cuisine) = cuisine {
        filters.push(RecipeFilter::Cuisine(cuisine));
    }
    if let Some(filter) = difficulty_filter(&difficulty) {
        filters.push(filter);
    }
    if !tag.is_empty() {
        filters.push(RecipeFilter::Tags(tag));
    }
    if let Some(minutes) = preparation_time_max {
        filters.push(RecipeFilter::PreparationTimeMax(minutes));
    }
    if let Some(minutes) = cooking_time_max {
        filters.push(RecipeFilter::CookingTimeMax(minutes));
    }
    let result = db
        .search_recipes(q.as_deref(), &filters, config.page(page, page_size))
        .map_err(internal_error)?;
    Ok(Json(result.into()))
}

#[get("/recipes/popular?<limit>")]
pub fn get_popular_recipes(
    db: &State<MongoRep>,
    limit: Option<i64>,
) -> Result<Json<Vec<RecipeWire>>, Status> {
    let recipes = db
        .get_popular_recipes(limit.unwrap_or(10).clamp(1, 100))
        .map_err(internal_error)?;
    Ok(Json(recipes.iter().map(RecipeWire::from).collect()))
}

#[get("/recipes/cuisines")]
pub fn list_cuisines(db: &State<MongoRep>) -> Result<Json<Vec<String>>, Status> {
    db.list_cuisines().map(Json).map_err(internal_error)
}

#[get("/recipes/tags")]
pub fn list_tags(db: &State<MongoRep>) -> Result<Json<Vec<String>>, Status> {
    db.list_tags().map(Json).map_err(internal_error)
}

#[get("/recipes/stats")]
pub fn get_recipe_stats(db: &State<MongoRep>) -> Result<Json<RecipeStats>, Status> {
    db.get_recipe_stats().map(Json).map_err(internal_error)
}

#[get("/recipes/<recipe_id>")]
pub fn get_recipe(db: &State<MongoRep>, recipe_id: &str) -> Result<Json<RecipeDetail>, Status> {
    let recipe = db
        .get_recipe(recipe_id)
        .map_err(internal_error)?
        .ok_or(Status::NotFound)?;
    let similar = db
        .get_similar_recipes(recipe_id, 3)
        .map_err(internal_error)?;
    Ok(Json(RecipeDetail {
        recipe: RecipeWire::from(&recipe),
        similar_recipes: similar.iter().map(RecipeWire::from).collect(),
    }))
}

#[post("/recipes", format = "json", data = "<draft>")]
pub fn create_recipe(
    db: &State<MongoRep>,
    draft: Json<RecipeDraft>,
) -> Result<Json<CreatedRecipe>, Status> {
    let id = db
        .create_recipe(draft.into_inner().into_recipe())
        .map_err(internal_error)?;
    Ok(Json(CreatedRecipe {
        status: "success",
        recipe_id: id.to_hex(),
    }))
}

#[patch("/recipes/<recipe_id>", format = "json", data = "<update>")]
pub fn update_recipe(
    db: &State<MongoRep>,
    recipe_id: &str,
    update: Json<RecipeUpdate>,
) -> Result<Json<StatusResponse>, Status> {
    let changed = db
        .update_recipe(recipe_id, &update)
        .map_err(internal_error)?;
    Ok(Json(StatusResponse::from(changed)))
}

#[delete("/recipes/<recipe_id>")]
pub fn delete_recipe(
    db: &State<MongoRep>,
    recipe_id: &str,
) -> Result<Json<StatusResponse>, Status> {
    match db.delete_recipe(recipe_id).map_err(internal_error)? {
        true => Ok(Json(StatusResponse::from(true))),
        false => Err(Status::NotFound),
    }
}

#[post("/recipes/<recipe_id>/comments", format = "json", data = "<comment>")]
pub fn add_comment(
    db: &State<MongoRep>,
    recipe_id: &str,
    comment: Json<CommentRequest>,
) -> Result<Json<StatusResponse>, Status> {
    let text = comment.text.trim();
    if text.is_empty() {
        return Err(Status::BadRequest);
    }
    let Ok(user_oid) = ObjectId::parse_str(&comment.user_id) else {
        return Err(Status::Unauthorized);
    };
    let username = db
        .get_user(&comment.user_id)
        .map_err(internal_error)?
        .map(|user| user.username)
        .unwrap_or_else(|| String::from("User"));
    let added = db
        .add_comment(recipe_id, user_oid, &username, text, None)
        .map_err(internal_error)?;
    Ok(Json(StatusResponse::from(added)))
}

#[post("/recipes/<recipe_id>/ratings", format = "json", data = "<rating>")]
pub fn add_rating(
    db: &State<MongoRep>,
    recipe_id: &str,
    rating: Json<RatingRequest>,
) -> Result<Json<StatusResponse>, Status> {
    if !(1.0..=5.0).contains(&rating.rating) {
        return Err(Status::BadRequest);
    }
    let Ok(user_oid) = ObjectId::parse_str(&rating.user_id) else {
        return Err(Status::Unauthorized);
    };
    let added = db
        .add_rating(recipe_id, user_oid, rating.rating)
        .map_err(internal_error)?;
    Ok(Json(StatusResponse::from(added)))
}

#[post("/users/register", format = "json", data = "<new_user>")]
pub fn register(
    db: &State<MongoRep>,
    new_user: Json<NewUser>,
) -> Result<Json<RegisterResponse>, Status> {
    match db.create_user(new_user.into_inner()) {
        Ok(id) => Ok(Json(RegisterResponse {
            status: "success",
            user_id: Some(id.to_hex()),
            message: None,
        })),
        Err(error @ MongoRepError::DuplicateUser) => Ok(Json(RegisterResponse {
            status: "error",
            user_id: None,
            message: Some(error.to_string()),
        })),
        Err(error) => Err(internal_error(error)),
    }
}

#[post("/users/login", format = "json", data = "<credentials>")]
pub fn login(
    db: &State<MongoRep>,
    credentials: Json<Credentials>,
) -> Result<Json<UserWire>, Status> {
    db.authenticate_user(&credentials.username, &credentials.password)
        .map_err(internal_error)?
        .map(|user| Json(UserWire::from(&user)))
        .ok_or(Status::Unauthorized)
}

#[get("/users/<user_id>")]
pub fn get_user_profile(
    db: &State<MongoRep>,
    user_id: &str,
) -> Result<Json<UserProfile>, Status> {
    let user = db
        .get_user(user_id)
        .map_err(internal_error)?
        .ok_or(Status::NotFound)?;
    let total_comments = db.count_user_comments(user_id).map_err(internal_error)?;
    Ok(Json(UserProfile {
        user: UserWire::from(&user),
        total_comments,
    }))
}

#[patch("/users/<user_id>", format = "json", data = "<update>")]
pub fn update_user(
    db: &State<MongoRep>,
    user_id: &str,
    update: Json<UserUpdate>,
) -> Result<Json<StatusResponse>, Status> {
    let changed = db.update_user(user_id, &update).map_err(internal_error)?;
    Ok(Json(StatusResponse::from(changed)))
}

#[patch("/users/<user_id>/preferences", format = "json", data = "<preferences>")]
pub fn update_preferences(
    db: &State<MongoRep>,
    user_id: &str,
    preferences: Json<PreferencesUpdate>,
) -> Result<Json<StatusResponse>, Status> {
    let changed = db
        .update_preferences(user_id, &preferences)
        .map_err(internal_error)?;
    Ok(Json(StatusResponse::from(changed)))
}

#[get("/users/<user_id>/recipes?<page>&<page_size>")]
pub fn get_user_recipes(
    db: &State<MongoRep>,
    config: &State<AppConfig>,
    user_id: &str,
    page: Option<u64>,
    page_size: Option<u64>,
) -> Result<Json<RecipePage>, Status> {
    let result = db
        .recipes_by_user(user_id, config.page(page, page_size))
        .map_err(internal_error)?;
    Ok(Json(result.into()))
}

#[post("/users/<user_id>/favorites/<recipe_id>")]
pub fn add_favorite(
    db: &State<MongoRep>,
    user_id: &str,
    recipe_id: &str,
) -> Result<Json<StatusResponse>, Status> {
    let added = db
        .add_favorite_recipe(user_id, recipe_id)
        .map_err(internal_error)?;
    Ok(Json(StatusResponse::from(added)))
}

#[delete("/users/<user_id>/favorites/<recipe_id>")]
pub fn remove_favorite(
    db: &State<MongoRep>,
    user_id: &str,
    recipe_id: &str,
) -> Result<Json<StatusResponse>, Status> {
    let removed = db
        .remove_favorite_recipe(user_id, recipe_id)
        .map_err(internal_error)?;
    Ok(Json(StatusResponse::from(removed)))
}

#[get("/users/<user_id>/favorites")]
pub fn get_favorites(
    db: &State<MongoRep>,
    user_id: &str,
) -> Result<Json<Vec<RecipeWire>>, Status> {
    let favorites = db.get_favorite_recipes(user_id).map_err(internal_error)?;
    Ok(Json(favorites.iter().map(RecipeWire::from).collect()))
}

#[get("/users/<user_id>/recommendations?<page>&<page_size>")]
pub fn get_recommendations(
    db: &State<MongoRep>,
    config: &State<AppConfig>,
    user_id: &str,
    page: Option<u64>,
    page_size: Option<u64>,
) -> Result<Json<RecipePage>, Status> {
    let profile = db
        .get_recommendation_profile(user_id)
        .map_err(internal_error)?
        .ok_or(Status::NotFound)?;
    let result = db
        .recommend_recipes(&profile, config.page(page, page_size))
        .map_err(internal_error)?;
    Ok(Json(result.into()))
}

#[cfg(test)]
mod tests {
    use super::super::mongo::Page;
    use super::*;

    #[test]
    fn test_difficulty_filter_drops_unknown_values() {
        let values = vec![String::from("Medium"), String::from("Bogus")];
        assert_eq!(
            difficulty_filter(&values),
            Some(RecipeFilter::Difficulty(vec![Difficulty::Medium]))
        );
        // nothing recognized: no constraint, rather than a coerced Easy match
        assert_eq!(difficulty_filter(&[String::from("Bogus")]), None);
        assert_eq!(difficulty_filter(&[]), None);
    }

    #[test]
    fn test_status_response_from_bool() {
        assert_eq!(StatusResponse::from(true).status, "success");
        assert_eq!(StatusResponse::from(false).status, "error");
    }

    #[test]
    fn test_recipe_draft_reparses_author_id() {
        let draft = RecipeDraft {
            name: String::from("Bibimbap"),
            ingredients: Vec::new(),
            instructions: Vec::new(),
            cuisine: String::from("Korean"),
            difficulty: Difficulty::Medium,
            preparation_time: 20,
            cooking_time: 15,
            nutritional_info: Default::default(),
            tags: Vec::new(),
            image_url: None,
            user_id: Some(ObjectId::new().to_hex()),
        };
        assert!(draft.clone().into_recipe().user_id.is_some());

        let anonymous = RecipeDraft {
            user_id: Some(String::from("not-an-object-id")),
            ..draft
        };
        assert_eq!(anonymous.into_recipe().user_id, None);
    }

    #[test]
    fn test_recipe_page_converts_to_wire_form() {
        let paged = PagedRecipes::empty(Page::new(2, 12));
        let page = RecipePage::from(paged);
        assert!(page.recipes.is_empty());
        assert_eq!(page.pagination.page, 2);
        assert_eq!(page.pagination.total_pages, 0);
    }
}
