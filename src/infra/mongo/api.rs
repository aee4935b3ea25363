use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use mongodb::{
    bson::{doc, from_document, oid::ObjectId, to_document, Bson, DateTime, Document},
    error::{Error as mongoError, ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    sync::{Client, Collection, Database},
    IndexModel,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use super::pipelines::{
    cuisine_counts_pipeline, cuisines_pipeline, difficulty_counts_pipeline,
    popular_recipes_pipeline, popular_tags_pipeline, recommendation_prefilter, rank_for_profile,
    similar_recipes_pipeline, tags_pipeline, time_averages_pipeline, user_comments_pipeline,
    RecommendationProfile,
};
use super::query::{build_query, Page, PagedRecipes, Pagination, RecipeFilter};
use super::types::{Comment, Difficulty, Ingredient, Rating, Recipe, SkillLevel, User};

const RECIPES_COLLECTION: &str = "recipes";
const USERS_COLLECTION: &str = "users";

const MONGO_DUPLICATE_KEY: i32 = 11000;

#[derive(Error, Debug)]
pub enum MongoRepError {
    #[error("error querying value")]
    QueryError(#[from] mongoError),
    #[error("error encoding document")]
    EncodeError(#[from] mongodb::bson::ser::Error),
    #[error("error decoding document")]
    DecodeError(#[from] mongodb::bson::de::Error),
    #[error("username or email already exists")]
    DuplicateUser,
    #[error("could not reach mongodb after {0} attempts")]
    ConnectionRetriesExhausted(u32),
}

fn is_duplicate_key(error: &mongoError) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == MONGO_DUPLICATE_KEY
        }
        _ => false,
    }
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Registration payload. The plaintext password is hashed on insert and never
/// stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
    #[serde(default)]
    pub favorite_cuisines: Vec<String>,
    #[serde(default)]
    pub cooking_skill_level: SkillLevel,
}

/// Partial recipe update; only the set fields reach `$set`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecipeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<Ingredient>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooking_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutritional_info: Option<HashMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Partial profile update. A supplied password is re-hashed before `$set`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dietary_preferences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_cuisines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooking_skill_level: Option<SkillLevel>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PreferencesUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dietary_preferences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_cuisines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooking_skill_level: Option<SkillLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountBucket {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeAverages {
    pub avg_prep_time: f64,
    pub avg_cook_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeStats {
    pub total_recipes: u64,
    pub cuisines: Vec<CountBucket>,
    pub difficulties: Vec<CountBucket>,
    pub time_averages: Option<TimeAverages>,
    pub popular_tags: Vec<CountBucket>,
}

pub struct MongoRep {
    pub recipes: Collection<Recipe>,
    pub users: Collection<User>,
    database: Database,
}

impl MongoRep {
    pub fn init(uri: &str, database: &str) -> Result<Self, MongoRepError> {
        let client = Client::with_uri_str(uri)?;
        let database = client.database(database);
        Ok(MongoRep {
            recipes: database.collection(RECIPES_COLLECTION),
            users: database.collection(USERS_COLLECTION),
            database,
        })
    }

    /// Connects and pings with bounded exponential backoff. The repository is
    /// unusable until this returns; callers abort on the final error.
    pub fn init_with_retry(
        uri: &str,
        database: &str,
        max_attempts: u32,
    ) -> Result<Self, MongoRepError> {
        let rep = MongoRep::init(uri, database)?;
        let mut delay = Duration::from_millis(500);
        for attempt in 1..=max_attempts {
            match rep.ping() {
                Ok(()) => {
                    info!(attempt, "connected to mongodb");
                    return Ok(rep);
                }
                Err(error) => {
                    warn!(attempt, %error, "mongodb not reachable");
                    if attempt < max_attempts {
                        thread::sleep(delay);
                        delay *= 2;
                    }
                }
            }
        }
        Err(MongoRepError::ConnectionRetriesExhausted(max_attempts))
    }

    fn ping(&self) -> Result<(), MongoRepError> {
        self.database.run_command(doc! { "ping": 1 }, None)?;
        Ok(())
    }

    /// Text index over name/tags/cuisine plus the secondary and unique
    /// indexes the query paths rely on.
    pub fn ensure_indexes(&self) -> Result<(), MongoRepError> {
        let text_keys = doc! { "name": "text", "tags": "text", "cuisine": "text" };
        self.recipes.create_index(
            IndexModel::builder()
                .keys(text_keys)
                .options(
                    IndexOptions::builder()
                        .name(String::from("recipe_search_index"))
                        .build(),
                )
                .build(),
            None,
        )?;
        for field in ["cuisine", "difficulty", "tags", "user_id", "created_at"] {
            let mut keys = Document::new();
            keys.insert(field, 1);
            self.recipes
                .create_index(IndexModel::builder().keys(keys).build(), None)?;
        }
        for field in ["username", "email"] {
            let mut keys = Document::new();
            keys.insert(field, 1);
            self.users.create_index(
                IndexModel::builder()
                    .keys(keys)
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )?;
        }
        for field in ["favorite_recipes", "dietary_preferences", "favorite_cuisines"] {
            let mut keys = Document::new();
            keys.insert(field, 1);
            self.users
                .create_index(IndexModel::builder().keys(keys).build(), None)?;
        }
        Ok(())
    }

    fn decode_recipes(
        &self,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Recipe>, MongoRepError> {
        self.recipes
            .aggregate(pipeline, None)?
            .map(|document| {
                document
                    .map_err(MongoRepError::from)
                    .and_then(|document| from_document::<Recipe>(document).map_err(MongoRepError::from))
            })
            .collect()
    }

    // ---- recipes ----

    pub fn create_recipe(&self, mut recipe: Recipe) -> Result<ObjectId, MongoRepError> {
        let id = recipe.id.unwrap_or_else(ObjectId::new);
        recipe.id = Some(id);
        let now = DateTime::now();
        recipe.created_at = now;
        recipe.updated_at = now;
        self.recipes.insert_one(&recipe, None)?;
        Ok(id)
    }

    /// A malformed id is treated as not found, never as an error.
    pub fn get_recipe(&self, recipe_id: &str) -> Result<Option<Recipe>, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(recipe_id) else {
            return Ok(None);
        };
        Ok(self.recipes.find_one(doc! { "_id": object_id }, None)?)
    }

    /// Merges the set fields and always refreshes `updated_at`. Returns
    /// whether any document changed.
    pub fn update_recipe(
        &self,
        recipe_id: &str,
        update: &RecipeUpdate,
    ) -> Result<bool, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(recipe_id) else {
            return Ok(false);
        };
        let mut set = to_document(update)?;
        set.insert("updated_at", DateTime::now());
        let result = self
            .recipes
            .update_one(doc! { "_id": object_id }, doc! { "$set": set }, None)?;
        Ok(result.modified_count > 0)
    }

    pub fn delete_recipe(&self, recipe_id: &str) -> Result<bool, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(recipe_id) else {
            return Ok(false);
        };
        let result = self.recipes.delete_one(doc! { "_id": object_id }, None)?;
        Ok(result.deleted_count > 0)
    }

    /// Appends a comment, stamping the current time when the caller did not
    /// supply one. Uses an atomic `$push`; concurrent appends are both kept.
    pub fn add_comment(
        &self,
        recipe_id: &str,
        user_id: ObjectId,
        username: &str,
        text: &str,
        date: Option<DateTime>,
    ) -> Result<bool, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(recipe_id) else {
            return Ok(false);
        };
        let comment = Comment {
            user_id,
            username: username.to_string(),
            text: text.to_string(),
            date: date.unwrap_or_else(DateTime::now),
        };
        let result = self.recipes.update_one(
            doc! { "_id": object_id },
            doc! { "$push": { "comments": to_document(&comment)? } },
            None,
        )?;
        Ok(result.modified_count > 0)
    }

    pub fn add_rating(
        &self,
        recipe_id: &str,
        user_id: ObjectId,
        rating: f64,
    ) -> Result<bool, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(recipe_id) else {
            return Ok(false);
        };
        let rating = Rating {
            user_id,
            rating,
            date: DateTime::now(),
        };
        let result = self.recipes.update_one(
            doc! { "_id": object_id },
            doc! { "$push": { "user_ratings": to_document(&rating)? } },
            None,
        )?;
        Ok(result.modified_count > 0)
    }

    /// Text search plus filters, paginated. Empty result sets come back as a
    /// well-formed empty page.
    pub fn search_recipes(
        &self,
        text: Option<&str>,
        filters: &[RecipeFilter],
        page: Page,
    ) -> Result<PagedRecipes, MongoRepError> {
        let query = build_query(text, filters);
        let total = self.recipes.count_documents(query.clone(), None)?;
        let options = FindOptions::builder()
            .skip(page.skip())
            .limit(page.size as i64)
            .build();
        let recipes = self
            .recipes
            .find(query, options)?
            .collect::<Result<Vec<Recipe>, mongoError>>()?;
        Ok(PagedRecipes {
            recipes,
            pagination: Pagination::new(page, total),
        })
    }

    /// Recipes created by a user, newest first. This listing reports at least
    /// one page even when empty.
    pub fn recipes_by_user(
        &self,
        user_id: &str,
        page: Page,
    ) -> Result<PagedRecipes, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(user_id) else {
            return Ok(PagedRecipes {
                recipes: Vec::new(),
                pagination: Pagination::with_min_one_page(page, 0),
            });
        };
        let query = build_query(None, &[RecipeFilter::Author(object_id)]);
        let total = self.recipes.count_documents(query.clone(), None)?;
        let options = FindOptions::builder()
            .skip(page.skip())
            .limit(page.size as i64)
            .sort(doc! { "created_at": -1 })
            .build();
        let recipes = self
            .recipes
            .find(query, options)?
            .collect::<Result<Vec<Recipe>, mongoError>>()?;
        Ok(PagedRecipes {
            recipes,
            pagination: Pagination::with_min_one_page(page, total),
        })
    }

    pub fn get_popular_recipes(&self, limit: i64) -> Result<Vec<Recipe>, MongoRepError> {
        self.decode_recipes(popular_recipes_pipeline(limit))
    }

    /// Similar recipes for a reference recipe; an unknown or malformed id
    /// yields an empty list.
    pub fn get_similar_recipes(
        &self,
        recipe_id: &str,
        limit: i64,
    ) -> Result<Vec<Recipe>, MongoRepError> {
        let Some(reference) = self.get_recipe(recipe_id)? else {
            return Ok(Vec::new());
        };
        let Some(reference_id) = reference.id else {
            return Ok(Vec::new());
        };
        self.decode_recipes(similar_recipes_pipeline(
            reference_id,
            &reference.tags,
            &reference.cuisine,
            limit,
        ))
    }

    /// Personalized recommendations: prefilter server-side, score and rank in
    /// process, paginate after the sort. The total counts everything the
    /// prefilter admits, independent of the page window.
    pub fn recommend_recipes(
        &self,
        profile: &RecommendationProfile,
        page: Page,
    ) -> Result<PagedRecipes, MongoRepError> {
        let filter = recommendation_prefilter(profile).unwrap_or_default();
        let total = self.recipes.count_documents(filter.clone(), None)?;
        let candidates = self
            .recipes
            .find(filter, None)?
            .collect::<Result<Vec<Recipe>, mongoError>>()?;
        let recipes = rank_for_profile(candidates, profile)
            .into_iter()
            .skip(page.skip() as usize)
            .take(page.size as usize)
            .collect();
        Ok(PagedRecipes {
            recipes,
            pagination: Pagination::new(page, total),
        })
    }

    pub fn count_user_comments(&self, user_id: &str) -> Result<u64, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(user_id) else {
            return Ok(0);
        };
        let mut cursor = self
            .recipes
            .aggregate(user_comments_pipeline(object_id), None)?;
        match cursor.next().transpose()? {
            Some(document) => Ok(document
                .get("total_comments")
                .and_then(int_value)
                .unwrap_or(0) as u64),
            None => Ok(0),
        }
    }

    pub fn list_cuisines(&self) -> Result<Vec<String>, MongoRepError> {
        self.distinct_values(cuisines_pipeline())
    }

    pub fn list_tags(&self) -> Result<Vec<String>, MongoRepError> {
        self.distinct_values(tags_pipeline())
    }

    fn distinct_values(&self, pipeline: Vec<Document>) -> Result<Vec<String>, MongoRepError> {
        let cursor = self.recipes.aggregate(pipeline, None)?;
        let mut values = Vec::new();
        for document in cursor {
            let document = document?;
            if let Ok(value) = document.get_str("_id") {
                values.push(value.to_string());
            }
        }
        Ok(values)
    }

    pub fn get_recipe_stats(&self) -> Result<RecipeStats, MongoRepError> {
        let total_recipes = self.recipes.count_documents(None, None)?;
        let cuisines = self.count_buckets(cuisine_counts_pipeline())?;
        let difficulties = self.count_buckets(difficulty_counts_pipeline())?;
        let popular_tags = self.count_buckets(popular_tags_pipeline())?;
        let mut cursor = self.recipes.aggregate(time_averages_pipeline(), None)?;
        let time_averages = cursor.next().transpose()?.and_then(|document| {
            Some(TimeAverages {
                avg_prep_time: document.get_f64("avg_prep_time").ok()?,
                avg_cook_time: document.get_f64("avg_cook_time").ok()?,
            })
        });
        Ok(RecipeStats {
            total_recipes,
            cuisines,
            difficulties,
            time_averages,
            popular_tags,
        })
    }

    fn count_buckets(&self, pipeline: Vec<Document>) -> Result<Vec<CountBucket>, MongoRepError> {
        let cursor = self.recipes.aggregate(pipeline, None)?;
        let mut buckets = Vec::new();
        for document in cursor {
            let document = document?;
            let Ok(value) = document.get_str("_id") else {
                continue;
            };
            let count = document.get("count").and_then(int_value).unwrap_or(0);
            buckets.push(CountBucket {
                value: value.to_string(),
                count,
            });
        }
        Ok(buckets)
    }

    // ---- users ----

    /// Inserts a new user with a hashed password. A duplicate username or
    /// email surfaces as [`MongoRepError::DuplicateUser`], a reported failure
    /// rather than a crash.
    pub fn create_user(&self, new_user: NewUser) -> Result<ObjectId, MongoRepError> {
        let id = ObjectId::new();
        let now = DateTime::now();
        let user = User {
            id: Some(id),
            username: new_user.username,
            email: new_user.email,
            password_hash: hash_password(&new_user.password),
            dietary_preferences: new_user.dietary_preferences,
            favorite_cuisines: new_user.favorite_cuisines,
            favorite_recipes: Vec::new(),
            cooking_skill_level: new_user.cooking_skill_level,
            created_at: now,
            updated_at: now,
        };
        match self.users.insert_one(&user, None) {
            Ok(_) => Ok(id),
            Err(error) if is_duplicate_key(&error) => Err(MongoRepError::DuplicateUser),
            Err(error) => Err(error.into()),
        }
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(user_id) else {
            return Ok(None);
        };
        Ok(self.users.find_one(doc! { "_id": object_id }, None)?)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, MongoRepError> {
        Ok(self.users.find_one(doc! { "username": username }, None)?)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, MongoRepError> {
        Ok(self.users.find_one(doc! { "email": email }, None)?)
    }

    /// Hashes the candidate password with the registration hash function and
    /// compares. No token issuance happens here.
    pub fn authenticate_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, MongoRepError> {
        Ok(self
            .get_user_by_username(username)?
            .filter(|user| user.password_hash == hash_password(password)))
    }

    /// A conflicting unique field (email taken by another user) reads as
    /// "nothing changed" rather than an error, so callers can report it.
    pub fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<bool, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(user_id) else {
            return Ok(false);
        };
        let mut set = to_document(update)?;
        if let Some(password) = &update.password {
            set.insert("password_hash", hash_password(password));
        }
        set.insert("updated_at", DateTime::now());
        match self
            .users
            .update_one(doc! { "_id": object_id }, doc! { "$set": set }, None)
        {
            Ok(result) => Ok(result.modified_count > 0),
            Err(error) if is_duplicate_key(&error) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    /// Returns false without touching the database when there is nothing to
    /// set.
    pub fn update_preferences(
        &self,
        user_id: &str,
        preferences: &PreferencesUpdate,
    ) -> Result<bool, MongoRepError> {
        let Ok(object_id) = ObjectId::parse_str(user_id) else {
            return Ok(false);
        };
        let mut set = to_document(preferences)?;
        if set.is_empty() {
            return Ok(false);
        }
        set.insert("updated_at", DateTime::now());
        let result = self
            .users
            .update_one(doc! { "_id": object_id }, doc! { "$set": set }, None)?;
        Ok(result.modified_count > 0)
    }

    /// Set-insert: adding an already-favorited recipe changes nothing and
    /// reports false.
    pub fn add_favorite_recipe(
        &self,
        user_id: &str,
        recipe_id: &str,
    ) -> Result<bool, MongoRepError> {
        let (Ok(user_oid), Ok(recipe_oid)) =
            (ObjectId::parse_str(user_id), ObjectId::parse_str(recipe_id))
        else {
            return Ok(false);
        };
        let result = self.users.update_one(
            doc! { "_id": user_oid },
            doc! { "$addToSet": { "favorite_recipes": recipe_oid } },
            None,
        )?;
        Ok(result.modified_count > 0)
    }

    /// Set-delete: removing a recipe that is not favorited is a no-op.
    pub fn remove_favorite_recipe(
        &self,
        user_id: &str,
        recipe_id: &str,
    ) -> Result<bool, MongoRepError> {
        let (Ok(user_oid), Ok(recipe_oid)) =
            (ObjectId::parse_str(user_id), ObjectId::parse_str(recipe_id))
        else {
            return Ok(false);
        };
        let result = self.users.update_one(
            doc! { "_id": user_oid },
            doc! { "$pull": { "favorite_recipes": recipe_oid } },
            None,
        )?;
        Ok(result.modified_count > 0)
    }

    /// Resolves a user's favorite ids to recipes, in favorites order.
    /// Favorites whose recipe has been deleted are skipped.
    pub fn get_favorite_recipes(&self, user_id: &str) -> Result<Vec<Recipe>, MongoRepError> {
        let Some(user) = self.get_user(user_id)? else {
            return Ok(Vec::new());
        };
        if user.favorite_recipes.is_empty() {
            return Ok(Vec::new());
        }
        let found = self
            .recipes
            .find(
                doc! { "_id": { "$in": user.favorite_recipes.clone() } },
                None,
            )?
            .collect::<Result<Vec<Recipe>, mongoError>>()?;
        let mut by_id: HashMap<ObjectId, Recipe> = found
            .into_iter()
            .filter_map(|recipe| recipe.id.map(|id| (id, recipe)))
            .collect();
        Ok(user
            .favorite_recipes
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    pub fn get_recommendation_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<RecommendationProfile>, MongoRepError> {
        Ok(self
            .get_user(user_id)?
            .as_ref()
            .map(RecommendationProfile::from))
    }
}

fn int_value(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) => Some(*n as i64),
        _ => None,
    }
}
