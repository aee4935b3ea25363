mod api;
mod pipelines;
mod query;
mod types;

pub use api::{
    hash_password, MongoRep, MongoRepError, NewUser, PreferencesUpdate, RecipeStats, RecipeUpdate,
    UserUpdate,
};
pub use pipelines::RecommendationProfile;
pub use query::{Page, PagedRecipes, Pagination, RecipeFilter};
pub use types::{
    Comment, CommentWire, Difficulty, Ingredient, Rating, RatingWire, Recipe, RecipeWire,
    SkillLevel, User, UserWire,
};
