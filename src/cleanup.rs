use std::{env, time::Duration};

use tokio::time;
use tracing::{debug, info};

use crate::logic::Rooms;

pub async fn start_cleanup_task(rooms: Rooms) {
    let cleanup_interval_secs: u64 = env::var("CLEANUP_INTERVAL_SECONDS")
        .unwrap_or_else(|_| "60".to_string())
        .parse()
        .unwrap_or(60);

    let inactive_timeout_secs: u64 = env::var("INACTIVE_ROOM_TIMEOUT_SECONDS")
        .unwrap_or_else(|_| "600".to_string())
        .parse()
        .unwrap_or(600);

    let finished_timeout_secs: u64 = env::var("FINISHED_ROOM_TIMEOUT_SECONDS")
        .unwrap_or_else(|_| "86400".to_string())
        .parse()
        .unwrap_or(86400);

    let mut interval = time::interval(Duration::from_secs(cleanup_interval_secs));

    info!(
        "Started room cleanup task: checking every {}s, inactive timeout: {}s, finished timeout: {}s",
        cleanup_interval_secs, inactive_timeout_secs, finished_timeout_secs
    );

    loop {
        interval.tick().await;
        cleanup_rooms(&rooms, inactive_timeout_secs, finished_timeout_secs).await;
    }
}

async fn cleanup_rooms(rooms: &Rooms, inactive_timeout_secs: u64, finished_timeout_secs: u64) {
    let mut rooms_to_remove = Vec::new();

    // First pass: identify rooms to remove
    for entry in rooms.iter() {
        let room_id = entry.key();
        let room = entry.value();

        // Try to lock the room, skip if we can't (probably in use)
        if let Ok(room_guard) = room.try_lock()
            && room_guard.should_cleanup(inactive_timeout_secs, finished_timeout_secs)
        {
            rooms_to_remove.push(room_id.clone());
        }
    }

    // Second pass: remove identified rooms
    let removed_count = rooms_to_remove.len();
    for room_id in rooms_to_remove {
        rooms.remove(&room_id);
        debug!("Cleaned up room: {}", room_id);
    }

    if removed_count > 0 {
        info!("Cleaned up {} abandoned rooms", removed_count);
    }
}
