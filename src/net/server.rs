//! TCP accept loop: one task per connection, each statement executed
//! against a shared, mutex-guarded [`Connection`]. Built on `tokio`, the
//! teacher's async runtime of choice, the way its connection-handling code
//! spawns one task per accepted socket.

use std::sync::Arc;

use serde_json::{Map, Value as Json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::api::{Connection, QueryResult};
use crate::error::DbResult;
use crate::net::wire::{read_request, write_response, Response};

fn result_to_json(result: &QueryResult) -> Vec<Json> {
    result
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (column, value) in row {
                object.insert(column.clone(), serde_json::to_value(value).unwrap_or(Json::Null));
            }
            Json::Object(object)
        })
        .collect()
}

async fn handle_connection(stream: TcpStream, db: Arc<Mutex<Connection>>) {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let request = match read_request(&mut reader).await {
            Ok(request) => request,
            Err(_) => return,
        };

        let response = {
            let mut db = db.lock().await;
            match db.execute(&request.query) {
                Ok(result) => {
                    let data = if result.row_count() > 0 { Some(result_to_json(&result)) } else { None };
                    Response { success: true, message: String::new(), data }
                }
                Err(e) => Response { success: false, message: e.to_string(), data: None },
            }
        };

        if write_response(&mut writer, &response).await.is_err() {
            return;
        }
    }
}

/// Accepts connections on `addr` until the process is killed, handling
/// each one on its own task against the shared `db`.
pub async fn serve(addr: &str, db: Connection) -> DbResult<()> {
    let listener = TcpListener::bind(addr).await?;
    let db = Arc::new(Mutex::new(db));
    loop {
        let (stream, _) = listener.accept().await?;
        let db = Arc::clone(&db);
        tokio::spawn(handle_connection(stream, db));
    }
}
