//! Client counterpart to the `echo_agent` example: initiates a task,
//! streams its events, and prints the final status.

use agentvault::card::CardResolver;
use agentvault::client::AgentVaultClient;
use agentvault::keys::{KeyManager, KeyManagerConfig};
use agentvault::types::{A2AEvent, Role};
use agentvault::utils::new_text_message;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let card = CardResolver::new()
        .fetch_from_url("http://127.0.0.1:8155/agent-card.json")
        .await?;
    println!("talking to {} v{}", card.name, card.agent_version);

    let keys = KeyManager::new(KeyManagerConfig::default());
    let client = AgentVaultClient::new();

    let task_id = client
        .initiate_task(
            &card,
            &keys,
            new_text_message(Role::User, "hello there"),
            Default::default(),
        )
        .await?;
    println!("task started: {task_id}");

    let mut events = client.receive_messages(&card, &keys, &task_id).await?;
    while let Some(event) = events.next().await {
        match event? {
            A2AEvent::StatusUpdate(update) => println!("status: {}", update.state),
            A2AEvent::Message(event) => println!("message: {:?}", event.message.parts),
            A2AEvent::ArtifactUpdate(event) => println!("artifact: {}", event.artifact.id),
        }
    }

    let task = client.get_task_status(&card, &keys, &task_id).await?;
    println!("final state: {} ({} messages)", task.state, task.messages.len());
    Ok(())
}
