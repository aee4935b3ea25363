use std::cmp::Reverse;

use mongodb::bson::{doc, oid::ObjectId, Document};

use super::types::{Recipe, SkillLevel, User};

/// Popularity ranking: recipes that have been rated at least once, ordered by
/// average rating and then by number of ratings.
pub fn popular_recipes_pipeline(limit: i64) -> Vec<Document> {
    vec![
        doc! { "$match": { "user_ratings": { "$exists": true, "$ne": [] } } },
        doc! { "$addFields": {
            "average_rating": { "$avg": "$user_ratings.rating" },
            "ratings_count": { "$size": "$user_ratings" },
        } },
        doc! { "$sort": { "average_rating": -1, "ratings_count": -1 } },
        doc! { "$limit": limit },
    ]
}

/// Similarity ranking relative to a reference recipe. A candidate qualifies
/// when it shares at least one tag or the cuisine (the reference itself is
/// excluded); its relevance is the number of shared tags plus one for a
/// cuisine match.
pub fn similar_recipes_pipeline(
    reference_id: ObjectId,
    tags: &[String],
    cuisine: &str,
    limit: i64,
) -> Vec<Document> {
    vec![
        doc! { "$match": {
            "_id": { "$ne": reference_id },
            "$or": [
                { "tags": { "$in": tags.to_vec() } },
                { "cuisine": cuisine },
            ],
        } },
        // $ifNull: a candidate matched via the cuisine branch may lack a
        // tags field, and $setIntersection rejects a missing operand
        doc! { "$addFields": {
            "common_tags": { "$size": { "$setIntersection": [
                { "$ifNull": ["$tags", []] },
                tags.to_vec(),
            ] } },
            "same_cuisine": { "$cond": [{ "$eq": ["$cuisine", cuisine] }, 1, 0] },
        } },
        doc! { "$addFields": {
            "relevance_score": { "$add": ["$common_tags", "$same_cuisine"] },
        } },
        doc! { "$sort": { "relevance_score": -1 } },
        doc! { "$limit": limit },
    ]
}

/// The slice of a user profile the recommendation ranking looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationProfile {
    pub dietary_preferences: Vec<String>,
    pub favorite_cuisines: Vec<String>,
    pub cooking_skill_level: SkillLevel,
    pub favorite_recipes: Vec<ObjectId>,
}

impl From<&User> for RecommendationProfile {
    fn from(user: &User) -> Self {
        RecommendationProfile {
            dietary_preferences: user.dietary_preferences.clone(),
            favorite_cuisines: user.favorite_cuisines.clone(),
            cooking_skill_level: user.cooking_skill_level,
            favorite_recipes: user.favorite_recipes.clone(),
        }
    }
}

/// Candidate restriction for recommendations: any of tag overlap, favorite
/// cuisine, or skill-appropriate difficulty. Returns `None` when the user has
/// stated no dietary preference and no favorite cuisine; the whole collection
/// is scored then, which leaves skill appropriateness as the only signal.
pub fn recommendation_prefilter(profile: &RecommendationProfile) -> Option<Document> {
    if profile.dietary_preferences.is_empty() && profile.favorite_cuisines.is_empty() {
        return None;
    }
    let difficulties: Vec<&str> = profile
        .cooking_skill_level
        .allowed_difficulties()
        .iter()
        .map(|difficulty| difficulty.as_str())
        .collect();
    Some(doc! { "$or": [
        { "tags": { "$in": profile.dietary_preferences.clone() } },
        { "cuisine": { "$in": profile.favorite_cuisines.clone() } },
        { "difficulty": { "$in": difficulties } },
    ] })
}

/// Recommendation score: dietary tag overlap count, plus one when the cuisine
/// is a favorite, plus one when the difficulty suits the user's skill.
pub fn recommendation_score(recipe: &Recipe, profile: &RecommendationProfile) -> u64 {
    let dietary_matches = profile
        .dietary_preferences
        .iter()
        .filter(|preference| recipe.tags.contains(preference))
        .count() as u64;
    let favorite_cuisine = profile.favorite_cuisines.contains(&recipe.cuisine) as u64;
    let appropriate_skill = profile
        .cooking_skill_level
        .allowed_difficulties()
        .contains(&recipe.difficulty) as u64;
    dietary_matches + favorite_cuisine + appropriate_skill
}

/// Orders candidates by descending recommendation score. The sort is stable,
/// so candidates with equal scores keep their datastore order.
pub fn rank_for_profile(mut candidates: Vec<Recipe>, profile: &RecommendationProfile) -> Vec<Recipe> {
    candidates.sort_by_key(|recipe| Reverse(recommendation_score(recipe, profile)));
    candidates
}

/// Counts the comments a user left across the whole recipe collection.
pub fn user_comments_pipeline(user_id: ObjectId) -> Vec<Document> {
    vec![
        doc! { "$match": { "comments.user_id": user_id } },
        doc! { "$unwind": "$comments" },
        doc! { "$match": { "comments.user_id": user_id } },
        doc! { "$count": "total_comments" },
    ]
}

/// Distinct cuisines, alphabetically.
pub fn cuisines_pipeline() -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$cuisine" } },
        doc! { "$sort": { "_id": 1 } },
    ]
}

/// Distinct tags, alphabetically.
pub fn tags_pipeline() -> Vec<Document> {
    vec![
        doc! { "$unwind": "$tags" },
        doc! { "$group": { "_id": "$tags" } },
        doc! { "$sort": { "_id": 1 } },
    ]
}

/// Recipe counts per cuisine, most common first.
pub fn cuisine_counts_pipeline() -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$cuisine", "count": { "$sum": 1 } } },
        doc! { "$sort": { "count": -1 } },
    ]
}

/// Recipe counts per difficulty.
pub fn difficulty_counts_pipeline() -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$difficulty", "count": { "$sum": 1 } } },
        doc! { "$sort": { "_id": 1 } },
    ]
}

/// Collection-wide average preparation and cooking times.
pub fn time_averages_pipeline() -> Vec<Document> {
    vec![doc! { "$group": {
        "_id": null,
        "avg_prep_time": { "$avg": "$preparation_time" },
        "avg_cook_time": { "$avg": "$cooking_time" },
    } }]
}

/// The ten most used tags with their counts.
pub fn popular_tags_pipeline() -> Vec<Document> {
    vec![
        doc! { "$unwind": "$tags" },
        doc! { "$group": { "_id": "$tags", "count": { "$sum": 1 } } },
        doc! { "$sort": { "count": -1 } },
        doc! { "$limit": 10 },
    ]
}
