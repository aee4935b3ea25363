use std::collections::HashMap;

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

fn utc_now() -> DateTime {
    DateTime::now()
}

/// Recipe difficulty. Unknown strings coming out of the database decode to
/// the default instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Strict lookup for inbound filter values; unlike the storage decode,
    /// unknown names are refused instead of defaulted.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Easy" => Some(Difficulty::Easy),
            "Medium" => Some(Difficulty::Medium),
            "Hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl From<String> for Difficulty {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Medium" => Difficulty::Medium,
            "Hard" => Difficulty::Hard,
            _ => Difficulty::Easy,
        }
    }
}

impl From<Difficulty> for String {
    fn from(value: Difficulty) -> Self {
        value.as_str().to_string()
    }
}

/// User cooking skill, mapped to the difficulties a recipe may have to count
/// as appropriate for that user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum SkillLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "Beginner",
            SkillLevel::Intermediate => "Intermediate",
            SkillLevel::Advanced => "Advanced",
        }
    }

    pub fn allowed_difficulties(&self) -> &'static [Difficulty] {
        match self {
            SkillLevel::Beginner => &[Difficulty::Easy],
            SkillLevel::Intermediate => &[Difficulty::Easy, Difficulty::Medium],
            SkillLevel::Advanced => &[Difficulty::Easy, Difficulty::Medium, Difficulty::Hard],
        }
    }
}

impl From<String> for SkillLevel {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Intermediate" => SkillLevel::Intermediate,
            "Advanced" => SkillLevel::Advanced,
            _ => SkillLevel::Beginner,
        }
    }
}

impl From<SkillLevel> for String {
    fn from(value: SkillLevel) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Ingredient {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Rating {
    pub user_id: ObjectId,
    pub rating: f64,
    #[serde(default = "utc_now")]
    pub date: DateTime,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Comment {
    pub user_id: ObjectId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "utc_now")]
    pub date: DateTime,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Recipe {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default)]
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
    pub user_id: Option<ObjectId>,
    #[serde(default)]
    pub user_ratings: Vec<Rating>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default = "utc_now")]
    pub created_at: DateTime,
    #[serde(default = "utc_now")]
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
    #[serde(default)]
    pub favorite_cuisines: Vec<String>,
    #[serde(default)]
    pub favorite_recipes: Vec<ObjectId>,
    #[serde(default)]
    pub cooking_skill_level: SkillLevel,
    #[serde(default = "utc_now")]
    pub created_at: DateTime,
    #[serde(default = "utc_now")]
    pub updated_at: DateTime,
}

// Wire forms: everything the API returns carries hex-string ids and RFC 3339
// timestamp strings, including the ids and dates nested in ratings and
// comments. Storage keeps the native ObjectId/DateTime types.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingWire {
    pub user_id: String,
    pub rating: f64,
    pub date: String,
}

impl From<&Rating> for RatingWire {
    fn from(rating: &Rating) -> Self {
        RatingWire {
            user_id: rating.user_id.to_hex(),
            rating: rating.rating,
            date: rating.date.to_rfc3339_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentWire {
    pub user_id: String,
    pub username: String,
    pub text: String,
    pub date: String,
}

impl From<&Comment> for CommentWire {
    fn from(comment: &Comment) -> Self {
        CommentWire {
            user_id: comment.user_id.to_hex(),
            username: comment.username.clone(),
            text: comment.text.clone(),
            date: comment.date.to_rfc3339_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeWire {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub name: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    pub cuisine: String,
    pub difficulty: Difficulty,
    pub preparation_time: i64,
    pub cooking_time: i64,
    pub nutritional_info: HashMap<String, f64>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub user_id: Option<String>,
    pub user_ratings: Vec<RatingWire>,
    pub comments: Vec<CommentWire>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Recipe> for RecipeWire {
    fn from(recipe: &Recipe) -> Self {
        RecipeWire {
            id: recipe.id.map(|id| id.to_hex()),
            name: recipe.name.clone(),
            ingredients: recipe.ingredients.clone(),
            instructions: recipe.instructions.clone(),
            cuisine: recipe.cuisine.clone(),
            difficulty: recipe.difficulty,
            preparation_time: recipe.preparation_time,
            cooking_time: recipe.cooking_time,
            nutritional_info: recipe.nutritional_info.clone(),
            tags: recipe.tags.clone(),
            image_url: recipe.image_url.clone(),
            user_id: recipe.user_id.map(|id| id.to_hex()),
            user_ratings: recipe.user_ratings.iter().map(RatingWire::from).collect(),
            comments: recipe.comments.iter().map(CommentWire::from).collect(),
            created_at: recipe.created_at.to_rfc3339_string(),
            updated_at: recipe.updated_at.to_rfc3339_string(),
        }
    }
}

/// API form of a user. The password hash never leaves storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserWire {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub username: String,
    pub email: String,
    pub dietary_preferences: Vec<String>,
    pub favorite_cuisines: Vec<String>,
    pub favorite_recipes: Vec<String>,
    pub cooking_skill_level: SkillLevel,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserWire {
    fn from(user: &User) -> Self {
        UserWire {
            id: user.id.map(|id| id.to_hex()),
            username: user.username.clone(),
            email: user.email.clone(),
            dietary_preferences: user.dietary_preferences.clone(),
            favorite_cuisines: user.favorite_cuisines.clone(),
            favorite_recipes: user.favorite_recipes.iter().map(|id| id.to_hex()).collect(),
            cooking_skill_level: user.cooking_skill_level,
            created_at: user.created_at.to_rfc3339_string(),
            updated_at: user.updated_at.to_rfc3339_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{doc, from_document, to_document, Bson};

    use super::*;

    fn sample_recipe() -> Recipe {
        Recipe {
            id: Some(ObjectId::new()),
            name: String::from("Shakshuka"),
            ingredients: vec![
                Ingredient {
                    name: String::from("eggs"),
                    quantity: String::from("4"),
                },
                Ingredient {
                    name: String::from("tomatoes"),
                    quantity: String::from("400g"),
                },
            ],
            instructions: vec![
                String::from("Simmer the sauce"),
                String::from("Poach the eggs in it"),
            ],
            cuisine: String::from("Middle Eastern"),
            difficulty: Difficulty::Medium,
            preparation_time: 10,
            cooking_time: 20,
            nutritional_info: HashMap::from([(String::from("calories"), 320.0)]),
            tags: vec![String::from("vegetarian"), String::from("brunch")],
            image_url: None,
            user_id: Some(ObjectId::new()),
            user_ratings: vec![Rating {
                user_id: ObjectId::new(),
                rating: 4.5,
                date: DateTime::now(),
            }],
            comments: vec![Comment {
                user_id: ObjectId::new(),
                username: String::from("alice"),
                text: String::from("lovely"),
                date: DateTime::now(),
            }],
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn test_recipe_round_trips_through_document() {
        let recipe = sample_recipe();
        let document = to_document(&recipe).unwrap();
        let decoded: Recipe = from_document(document).unwrap();
        assert_eq!(recipe, decoded);
    }

    #[test]
    fn test_recipe_document_keeps_native_types() {
        let recipe = sample_recipe();
        let document = to_document(&recipe).unwrap();
        assert!(matches!(document.get("_id"), Some(Bson::ObjectId(_))));
        assert!(matches!(document.get("created_at"), Some(Bson::DateTime(_))));
        let ratings = document.get_array("user_ratings").unwrap();
        let Bson::Document(first) = &ratings[0] else {
            panic!("rating is not a document")
        };
        assert!(matches!(first.get("user_id"), Some(Bson::ObjectId(_))));
        assert!(matches!(first.get("date"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn test_decode_fills_missing_fields_with_defaults() {
        let document = doc! { "name": "Plain toast" };
        let recipe: Recipe = from_document(document).unwrap();
        assert_eq!(recipe.name, "Plain toast");
        assert_eq!(recipe.difficulty, Difficulty::Easy);
        assert!(recipe.tags.is_empty());
        assert!(recipe.user_ratings.is_empty());
        assert!(recipe.comments.is_empty());
        assert_eq!(recipe.user_id, None);

        let document = doc! { "username": "bob" };
        let user: User = from_document(document).unwrap();
        assert_eq!(user.cooking_skill_level, SkillLevel::Beginner);
        assert!(user.favorite_recipes.is_empty());
    }

    #[test]
    fn test_unknown_enum_strings_decode_to_default() {
        let document = doc! { "name": "x", "difficulty": "Impossible" };
        let recipe: Recipe = from_document(document).unwrap();
        assert_eq!(recipe.difficulty, Difficulty::Easy);

        let document = doc! { "username": "x", "cooking_skill_level": "Wizard" };
        let user: User = from_document(document).unwrap();
        assert_eq!(user.cooking_skill_level, SkillLevel::Beginner);
    }

    #[test]
    fn test_wire_form_uses_strings_throughout() {
        let recipe = sample_recipe();
        let wire = RecipeWire::from(&recipe);
        assert_eq!(
            wire.id.as_deref(),
            Some(recipe.id.unwrap().to_hex().as_str())
        );
        assert_eq!(
            wire.user_id.as_deref(),
            Some(recipe.user_id.unwrap().to_hex().as_str())
        );
        assert_eq!(wire.created_at, recipe.created_at.to_rfc3339_string());
        assert_eq!(
            wire.user_ratings[0].user_id,
            recipe.user_ratings[0].user_id.to_hex()
        );
        assert_eq!(
            wire.comments[0].date,
            recipe.comments[0].date.to_rfc3339_string()
        );
    }

    #[test]
    fn test_user_wire_form_omits_password_hash() {
        let user = User {
            id: Some(ObjectId::new()),
            username: String::from("carol"),
            email: String::from("carol@example.com"),
            password_hash: String::from("deadbeef"),
            dietary_preferences: vec![String::from("vegan")],
            favorite_cuisines: vec![String::from("Thai")],
            favorite_recipes: vec![ObjectId::new()],
            cooking_skill_level: SkillLevel::Advanced,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        };
        let wire = UserWire::from(&user);
        let json = serde_json::to_string(&wire).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("deadbeef"));
        assert_eq!(wire.favorite_recipes[0], user.favorite_recipes[0].to_hex());
    }

    #[test]
    fn test_difficulty_from_name_is_strict() {
        assert_eq!(Difficulty::from_name("Hard"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::from_name("Bogus"), None);
        assert_eq!(Difficulty::from_name("easy"), None);
    }

    #[test]
    fn test_skill_level_difficulty_mapping() {
        assert_eq!(
            SkillLevel::Beginner.allowed_difficulties(),
            &[Difficulty::Easy]
        );
        assert_eq!(
            SkillLevel::Intermediate.allowed_difficulties(),
            &[Difficulty::Easy, Difficulty::Medium]
        );
        assert_eq!(
            SkillLevel::Advanced.allowed_difficulties(),
            &[Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
        );
    }
}
