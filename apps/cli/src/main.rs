use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use taskboard_api::{Chat, Claim, CreateTaskRequest, Message, SubmitCompletionRequest, Task};
use taskboard_config::load as load_config;
use taskboard_realtime::{EventCategory, HandlerError, LifecycleEvent, RealtimeEvent};
use taskboard_runtime::{shutdown_signal, telemetry, SyncServices};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Taskboard sync client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the realtime channel and log pushed events until Ctrl-C
    Watch,
    /// List open tasks
    Tasks,
    /// List tasks owned or claimed by this device
    MyTasks,
    /// Show one task
    Task { task_id: String },
    /// Post a new task
    CreateTask {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        reward: f64,
        #[arg(long, default_value_t = 1)]
        max_claimants: u32,
        /// Hours from now until claims close
        #[arg(long, default_value_t = 24)]
        claim_hours: i64,
        /// Hours from now until the owner must review submissions
        #[arg(long, default_value_t = 72)]
        review_hours: i64,
    },
    /// Claim a task
    Claim { task_id: String },
    /// List claims on a task
    Claims { task_id: String },
    /// Submit completion for a claim
    Submit {
        claim_id: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        image_url: Option<String>,
    },
    /// Approve a submitted claim
    Approve { claim_id: String },
    /// Reject a submitted claim
    Reject { claim_id: String },
    /// List chats on a task
    Chats { task_id: String },
    /// Open (or create) the chat for a task
    OpenChat {
        task_id: String,
        /// Claimer to chat with, when run by the task owner
        #[arg(long)]
        claimer_id: Option<String>,
    },
    /// Show the latest messages of a chat
    Messages { chat_id: String },
    /// Send a message
    Send { chat_id: String, content: String },
    /// Delete a chat for both participants
    DeleteChat { chat_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;
    let services = SyncServices::initialise(&config)
        .await
        .context("failed to initialise sync services")?;

    let stores = &services.stores;
    match cli.command {
        Commands::Watch => watch(&services).await?,
        Commands::Tasks => print_tasks(&stores.tasks.fetch_open_tasks().await?),
        Commands::MyTasks => print_tasks(&stores.tasks.fetch_my_tasks().await?),
        Commands::Task { task_id } => print_tasks(&[stores.tasks.fetch_task(&task_id).await?]),
        Commands::CreateTask {
            title,
            description,
            reward,
            max_claimants,
            claim_hours,
            review_hours,
        } => {
            let now = Utc::now();
            let request = CreateTaskRequest {
                title,
                description,
                reward_amount: reward,
                max_claimants,
                claim_deadline: now + Duration::hours(claim_hours),
                owner_deadline: now + Duration::hours(review_hours),
            };
            let task = stores.tasks.create_task(&request).await?;
            println!("created task {}", task.id);
        }
        Commands::Claim { task_id } => {
            let claim = stores.claims.claim_task(&task_id).await?;
            println!("claimed task {} as {}", task_id, claim.id);
        }
        Commands::Claims { task_id } => print_claims(&stores.claims.fetch_claims(&task_id).await?),
        Commands::Submit {
            claim_id,
            text,
            image_url,
        } => {
            let request = SubmitCompletionRequest { text, image_url };
            let claim = stores.claims.submit_completion(&claim_id, &request).await?;
            print_claims(&[claim]);
        }
        Commands::Approve { claim_id } => {
            stores.claims.approve_claim(&claim_id).await?;
            println!("approved claim {claim_id}");
        }
        Commands::Reject { claim_id } => {
            stores.claims.reject_claim(&claim_id).await?;
            println!("rejected claim {claim_id}");
        }
        Commands::Chats { task_id } => print_chats(&stores.chats.fetch_chats(&task_id).await?),
        Commands::OpenChat {
            task_id,
            claimer_id,
        } => {
            let chat = stores
                .chats
                .get_or_create_chat(&task_id, claimer_id.as_deref())
                .await?;
            print_chats(&[chat.clone()]);
            print_messages(&stores.chats.messages(&chat.id));
        }
        Commands::Messages { chat_id } => print_messages(&stores.chats.fetch_messages(&chat_id).await?),
        Commands::Send { chat_id, content } => {
            let message = stores.chats.send_message(&chat_id, &content).await?;
            println!("sent message {}", message.id);
        }
        Commands::DeleteChat { chat_id } => {
            stores.chats.delete_chat(&chat_id).await?;
            println!("deleted chat {chat_id}");
        }
    }

    Ok(())
}

async fn watch(services: &SyncServices) -> anyhow::Result<()> {
    let (lost_tx, mut lost_rx) = mpsc::unbounded_channel();
    services
        .dispatcher
        .subscribe(EventCategory::Lifecycle, move |event| -> Result<(), HandlerError> {
            if let RealtimeEvent::Lifecycle(lifecycle) = event {
                info!(?lifecycle, "connection");
                if let LifecycleEvent::ConnectionLost { attempts } = lifecycle {
                    let _ = lost_tx.send(*attempts);
                }
            }
            Ok(())
        });
    for category in EventCategory::DATA {
        services.dispatcher.subscribe(category, |event| -> Result<(), HandlerError> {
            info!(
                category = %event.category(),
                id = event.entity_id().unwrap_or_default(),
                "event received"
            );
            Ok(())
        });
    }

    services
        .connection
        .connect()
        .await
        .context("failed to connect realtime channel")?;
    info!(endpoint = %services.connection.endpoint(), "watching for events");

    tokio::select! {
        _ = shutdown_signal() => {}
        Some(attempts) = lost_rx.recv() => {
            warn!(attempts, "connection lost, stopping");
        }
    }

    services.connection.disconnect().await;
    Ok(())
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks found");
        return;
    }
    println!(
        "{:<38} {:<30} {:>10} {:>5} {:<10} {:<25}",
        "ID", "Title", "Reward", "Max", "Status", "Claim Deadline"
    );
    println!("{}", "-".repeat(123));
    for task in tasks {
        println!(
            "{:<38} {:<30} {:>10.2} {:>5} {:<10} {:<25}",
            task.id,
            task.title,
            task.reward_amount,
            task.max_claimants,
            format!("{:?}", task.status),
            task.claim_deadline.to_rfc3339()
        );
    }
}

fn print_claims(claims: &[Claim]) {
    if claims.is_empty() {
        println!("No claims found");
        return;
    }
    println!("{:<38} {:<38} {:<10} {:<9}", "ID", "Claimer", "Status", "Submitted");
    println!("{}", "-".repeat(98));
    for claim in claims {
        println!(
            "{:<38} {:<38} {:<10} {:<9}",
            claim.id,
            claim.claimer_id,
            format!("{:?}", claim.status),
            claim.is_submitted()
        );
    }
}

fn print_chats(chats: &[Chat]) {
    if chats.is_empty() {
        println!("No chats found");
        return;
    }
    println!("{:<38} {:<38} {:<38}", "ID", "Participant", "Other");
    println!("{}", "-".repeat(116));
    for chat in chats {
        println!(
            "{:<38} {:<38} {:<38}",
            chat.id, chat.participant_id, chat.other_participant_id
        );
    }
}

fn print_messages(messages: &[Message]) {
    if messages.is_empty() {
        println!("No messages yet");
        return;
    }
    for message in messages {
        println!(
            "[{}] {}: {}",
            message.created_at.format("%Y-%m-%d %H:%M"),
            message.sender_id,
            message.content
        );
    }
}
