mod infra;
use infra::*;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Request, Response};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[macro_use]
extern crate rocket;
pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "Attaching CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, PATCH, DELETE, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

#[launch]
fn rocket() -> _ {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let config = AppConfig::from_env();
    let db = MongoRep::init_with_retry(&config.mongo_uri, &config.database, config.connect_attempts)
        .unwrap();
    if let Err(error) = db.ensure_indexes() {
        warn!(%error, "could not create indexes");
    }
    rocket::build()
        .manage(db)
        .manage(config)
        .mount(
            "/",
            routes![
                search_recipes,
                get_popular_recipes,
                list_cuisines,
                list_tags,
                get_recipe_stats,
                get_recipe,
                create_recipe,
                update_recipe,
                delete_recipe,
                add_comment,
                add_rating,
                register,
                login,
                get_user_profile,
                update_user,
                update_preferences,
                get_user_recipes,
                add_favorite,
                remove_favorite,
                get_favorites,
                get_recommendations
            ],
        )
        .attach(CORS)
}
