use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use resbook::config;
use resbook::domain::clock::SharedClock;
use resbook::domain::id::UserId;
use resbook::domain::mailer::LogMailer;
use resbook::domain::monitoring::LogAlertSync;
use resbook::domain::notification::SubscriptionNotificationScheduler;
use resbook::domain::processor::{EventProcessor, WakeupSignal};
use resbook::domain::scheduler::{AdmissionScheduler, TimelineBuilder};
use resbook::domain::store::task_store::TaskStore;
use resbook::logger;

/// Books time-boxed resource claims onto cluster nodes and drives their
/// lifecycle events.
#[derive(Parser, Debug)]
#[command(name = "resbook")]
struct Args {
    /// Path to the system model JSON file (nodes, users, limits, bookings).
    #[arg(long)]
    model: String,

    /// Optional settings JSON file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    if let Some(path) = &args.config {
        config::init_from_file(path).with_context(|| format!("loading settings from '{}'", path))?;
    }
    let settings = config::get_settings();

    let (directory, model) = resbook::load_system_model(&args.model).with_context(|| format!("loading model from '{}'", args.model))?;

    let store = TaskStore::new();
    let clock = SharedClock::default();
    let wakeup = WakeupSignal::new();

    let scheduler = AdmissionScheduler::new(
        store.clone(),
        Arc::new(directory.clone()),
        Arc::new(directory.clone()),
        Arc::new(SubscriptionNotificationScheduler::new(store.clone(), directory.clone())),
        Arc::new(LogAlertSync),
        wakeup.clone(),
        clock.clone(),
    );

    let processor = Arc::new(EventProcessor::new(
        store.clone(),
        directory.clone(),
        Arc::new(LogMailer::new(settings.smtp.clone())),
        Arc::new(LogAlertSync),
        clock.clone(),
        settings,
        wakeup.clone(),
    ));
    let processor_task = tokio::spawn({
        let processor = processor.clone();
        async move { processor.run().await }
    });

    let mut span: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> = None;
    for booking in model.bookings {
        let owner = UserId::new(&booking.owner);
        let name = booking.name.clone();
        match scheduler.schedule(booking.into_request(), &owner) {
            Ok(admitted) => {
                let response = resbook::api::task_dto::TaskResponseDto::from(&admitted);
                println!("{}", serde_json::to_string_pretty(&response)?);
                span = Some(match span {
                    Some((start, end)) => (start.min(admitted.task.start_time), end.max(admitted.task.end_time)),
                    None => (admitted.task.start_time, admitted.task.end_time),
                });
            }
            Err(e) => log::error!("Booking '{}' was rejected: {}", name, e),
        }
    }

    if let Some((start, end)) = span {
        let timeline = TimelineBuilder::new(store.clone(), Arc::new(directory.clone()));
        let periods = timeline.availability(start, end, None)?;
        log::info!("Availability over {} - {}: {} period(s) with partial load.", start, end, periods.len());
        for period in &periods {
            let dto = resbook::api::task_dto::AvailabilityPeriodDto::from(period);
            println!("{}", serde_json::to_string_pretty(&dto)?);
        }
    }

    log::info!("{} task(s) and {} event(s) in the store; processor is live. Ctrl-C to stop.", store.task_count(), store.event_count());

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down.");
    processor_task.abort();

    Ok(())
}
