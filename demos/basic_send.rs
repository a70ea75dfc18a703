//! Basic Outbox Example
//!
//! This example demonstrates how to:
//! - Load settings from `SMTP_*` environment variables
//! - Queue a plain-text and a multipart message
//! - Wait for delivery and error callbacks
//!
//! Run with e.g. `SMTP_HOST=localhost SMTP_PORT=1025 cargo run --example basic_send`.

use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

use lettre::message::{header::ContentType, Attachment, MultiPart, SinglePart};
use smtp_outbox::{Client, Message, Settings, SmtpError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    println!("Delivering through {}", settings.address());

    let client = Client::new();
    client.setup(settings)?;

    let (tx, rx) = mpsc::channel::<Result<String, SmtpError>>();
    let delivered = Mutex::new(tx.clone());
    client.on_delivery(move |event| {
        let subject = event.message.subject().unwrap_or_default().to_string();
        let _ = delivered.lock().map(|tx| tx.send(Ok(subject)));
    });
    let failed = Mutex::new(tx);
    client.on_error(move |event| {
        let error = SmtpError::new(event.error.kind(), event.error.to_string());
        if event.message.is_some() && !event.requeued {
            let _ = failed.lock().map(|tx| tx.send(Err(error)));
        } else {
            eprintln!("Delivery problem (will retry): {}", error);
        }
    });

    // Simple text message
    client.send_text(
        "recipient@example.com",
        "sender@example.com",
        "Hello from the outbox!",
        "This is a simple text email.\n\nBest regards,\nThe SMTP Bot",
    )?;

    // Multipart message with an attachment
    let report = Message::builder()
        .from("Reports <sender@example.com>".parse()?)
        .to("recipient@example.com".parse()?)
        .subject("Monthly report")
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(String::from("The report is attached.")))
                .singlepart(
                    Attachment::new(String::from("report.csv"))
                        .body(String::from("month,sent\nJanuary,42\n"), ContentType::TEXT_PLAIN),
                ),
        )?;
    let id = client.send(report)?;
    println!("Queued report as {}", id);
    println!("Outbox size: {}", client.outbox_size());

    for _ in 0..2 {
        match rx.recv_timeout(Duration::from_secs(60)) {
            Ok(Ok(subject)) => println!("Delivered: {}", subject),
            Ok(Err(e)) => eprintln!("Rejected: {}", e),
            Err(_) => {
                eprintln!("Timed out waiting for delivery");
                break;
            }
        }
    }

    let metrics = client.metrics();
    println!(
        "Delivered {} of {} queued messages",
        metrics.messages_delivered, metrics.messages_queued
    );
    Ok(())
}
