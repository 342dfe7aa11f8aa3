use futures_util::{SinkExt, StreamExt};
use pong_shared::{
    decode_server_message, encode_client_message, Action, ClientMessage, ServerMessage,
};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8765".to_string());

    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("Connected to {}", url);
    let (mut write, mut read) = ws_stream.split();

    // Catch-up snapshot
    if let Some(message) = next_message(&mut read).await? {
        println!("Initial: {:?}", message);
    }

    let action = ClientMessage::Action {
        player: 1,
        action: Action::Up,
    };
    write.send(Message::Text(encode_client_message(&action)?)).await?;
    println!("Sent player 1 up");

    let mut updates = 0;
    while updates < 3 {
        match next_message(&mut read).await? {
            Some(ServerMessage::State(snapshot)) => {
                updates += 1;
                println!(
                    "Tick {}: ball ({:.0}, {:.0}) paddles {:.0}/{:.0} score {}-{}{}",
                    snapshot.tick,
                    snapshot.ball.x,
                    snapshot.ball.y,
                    snapshot.paddle1.y,
                    snapshot.paddle2.y,
                    snapshot.score1,
                    snapshot.score2,
                    if snapshot.done { " (done)" } else { "" }
                );
            }
            Some(other) => println!("Other: {:?}", other),
            None => {
                println!("Server closed the connection");
                return Ok(());
            }
        }
    }

    write.send(Message::Close(None)).await?;
    println!("Disconnected");
    Ok(())
}

async fn next_message<S>(read: &mut S) -> Result<Option<ServerMessage>, Box<dyn std::error::Error>>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = match timeout(Duration::from_secs(5), read.next()).await {
            Ok(frame) => frame,
            Err(_) => return Err("timed out waiting for the server".into()),
        };
        match frame {
            Some(Ok(Message::Text(text))) => return Ok(Some(decode_server_message(&text)?)),
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
