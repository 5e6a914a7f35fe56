use std::sync::Arc;

use dashmap::Entry;
use nanoid::nanoid;
use rocket::{
    State,
    futures::{SinkExt, StreamExt, stream::SplitSink},
    get,
    http::Status,
    post,
    serde::json::Json,
};
use rocket_ws::{Channel, Message, WebSocket, stream::DuplexStream};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    logic::{Room, Rooms, run_countdown, validate_params},
    model::{
        BoardParams,
        api::{CreateRequest, CreateResponse},
        client::ClientMessage,
        server::{JoinErrorKind, ServerMessage},
    },
    rate_limit::{ClientIp, RateLimiter, check_rate_limit},
};

const ROOM_ID_ALPHABET: [char; 26] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z',
];

#[instrument(level = "trace", skip(rooms, passcode, params))]
fn add_room(rooms: &State<Rooms>, passcode: String, params: BoardParams) -> String {
    let mut id_length = 4;
    let max_attempts_per_length = 10;

    loop {
        for _ in 0..max_attempts_per_length {
            let id = nanoid!(id_length, &ROOM_ID_ALPHABET);
            match rooms.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Room ID collision, trying another: {}", id);
                    continue;
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(Mutex::new(Room::new(
                        id.clone(),
                        passcode,
                        params,
                    ))));
                    return id;
                }
            }
        }

        warn!(
            "Exhausted ID attempts at length {}, increasing to {}",
            id_length,
            id_length + 1
        );
        id_length += 1;
    }
}

#[post("/create", data = "<request>")]
#[instrument(level = "trace", skip(request, rooms, rate_limiter), fields(client_ip = %client_ip.0))]
pub fn create_room(
    request: Json<CreateRequest>,
    rooms: &State<Rooms>,
    rate_limiter: &State<RateLimiter>,
    client_ip: ClientIp,
) -> Result<Json<CreateResponse>, Status> {
    info!(
        "Room creation request from {}: {}x{} with {} mines",
        client_ip.0, request.params.height, request.params.width, request.params.mines
    );

    if let Err(status) = check_rate_limit(rate_limiter, &client_ip) {
        warn!("Rate limit exceeded for client {}", client_ip.0);
        return Err(status);
    }

    if request.passcode.is_empty() {
        warn!("Rejecting room creation without a passcode");
        return Err(Status::UnprocessableEntity);
    }

    if let Err(err) = validate_params(&request.params) {
        warn!("Rejecting room creation: {}", err);
        return Err(Status::UnprocessableEntity);
    }

    let request = request.into_inner();
    let id = add_room(rooms, request.passcode, request.params);

    info!(
        "Successfully created room {} for client {}",
        id, client_ip.0
    );
    Ok(Json(CreateResponse { id }))
}

/// Reports a rejected join to the connecting client before the connection
/// is closed. Room state is never touched on any of these paths.
async fn send_join_error(write: &mut SplitSink<DuplexStream, Message>, kind: JoinErrorKind) {
    let message = ServerMessage::JoinError {
        kind,
        message: kind.message().to_string(),
    };
    if let Ok(text) = serde_json::to_string(&message) {
        let _ = write.send(Message::Text(text)).await;
    }
}

#[get("/ws?<id>&<passcode>")]
#[instrument(level = "trace", skip(ws, rooms, passcode), fields(room_id = %id))]
pub fn websocket_handler(
    ws: WebSocket,
    rooms: &State<Rooms>,
    id: String,
    passcode: String,
) -> Channel<'static> {
    let rooms = rooms.inner().clone();

    ws.channel(move |stream| {
        let room_id = id.clone();
        Box::pin(async move {
            let (mut write, mut read) = stream.split();

            let room = rooms.get(&room_id).map(|entry| entry.value().clone());
            let Some(room) = room else {
                warn!("Connection attempt for non-existent room: {}", room_id);
                send_join_error(&mut write, JoinErrorKind::RoomNotFound).await;
                return Ok(());
            };
            info!("WebSocket connection established for room: {}", room_id);

            let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

            let outcome = { room.lock().await.join(&passcode, tx.clone()) };
            let (participant_id, side) = match outcome {
                Ok(outcome) => {
                    if let Some(epoch) = outcome.countdown_epoch {
                        tokio::spawn(run_countdown(room.clone(), epoch));
                    }
                    (outcome.participant_id, outcome.side)
                }
                Err(kind) => {
                    warn!("Join rejected for room {}: {:?}", room_id, kind);
                    send_join_error(&mut write, kind).await;
                    return Ok(());
                }
            };

            info!(
                "{:?} connected to room {} (participant: {})",
                side, room_id, participant_id
            );

            // Forward room broadcasts to this socket; the channel closes
            // once the room and this handler have dropped their senders.
            let writer = tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    if let Ok(text) = serde_json::to_string(&message)
                        && write.send(Message::Text(text)).await.is_err()
                    {
                        break;
                    }
                }
            });

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Reveal { pos }) => {
                            debug!(
                                "{:?} revealing tile ({}, {}) in room {}",
                                side, pos.row, pos.col, room_id
                            );
                            // The side bound at join time is authoritative;
                            // nothing from the message can reassign it.
                            let mut room = room.lock().await;
                            room.reveal(side, pos);
                        }
                        Err(e) => {
                            warn!(
                                "Invalid message format in room {}: {} - Error: {}",
                                room_id, text, e
                            );
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!(
                            "WebSocket connection closed for room {} (participant: {})",
                            room_id, participant_id
                        );
                        break;
                    }
                    Err(e) => {
                        error!(
                            "WebSocket error in room {} (participant: {}): {}",
                            room_id, participant_id, e
                        );
                        break;
                    }
                    _ => {
                        debug!("Received non-text message in room {}, ignoring", room_id);
                    }
                }
            }

            {
                let mut room = room.lock().await;
                room.disconnect(participant_id);
            }
            drop(tx);
            let _ = writer.await;

            info!(
                "{:?} disconnected from room {} (participant: {})",
                side, room_id, participant_id
            );
            Ok(())
        })
    })
}
