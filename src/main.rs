use artofwar_server::{
    cleanup::start_cleanup_task,
    cors::create_cors,
    logic::Rooms,
    rate_limit::create_rate_limiter,
    routes::{create_room, websocket_handler},
};
use dashmap::DashMap;
use rocket::{
    Build, Rocket,
    fairing::{Fairing, Info, Kind},
    routes,
};
use std::sync::Arc;
use tracing::{info, warn};

struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Cleanup Task",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        if let Some(rooms) = rocket.state::<Rooms>() {
            info!("Starting cleanup task for room management");
            let rooms_for_cleanup = rooms.clone();
            tokio::spawn(async move {
                start_cleanup_task(rooms_for_cleanup).await;
            });
        } else {
            warn!("Failed to get rooms state for cleanup task");
        }
        Ok(rocket)
    }
}

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    tracing_subscriber::fmt::init();
    info!("Starting territory minesweeper server");

    let rooms: Rooms = Arc::new(DashMap::new());
    let rate_limiter = create_rate_limiter();

    let rocket = rocket::build()
        .attach(create_cors())
        .attach(CleanupFairing)
        .manage(rooms)
        .manage(rate_limiter)
        .mount("/", routes![create_room, websocket_handler]);

    info!("Endpoints: POST /create, GET /ws");

    rocket
}
