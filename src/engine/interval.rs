//! Wall-clock phase driver. Sleeps through the lead, active and trail phases
//! and tells the multiplexer when to clear the trail set and when to report.
//! Both commands block on an ack so phase boundaries are atomic with respect
//! to feed arrivals.

use super::types::EngineCommand;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub struct IntervalController {
    pub commands: mpsc::Sender<EngineCommand>,
    pub lead_time_secs: u64,
    pub interval_secs: u64,
    pub trail_time_secs: u64,
    pub num_intervals: usize,
    /// Echoed in the per-interval banner.
    pub min_price_gwei: Option<f64>,
}

impl IntervalController {
    /// Returns after the final interval's report has been printed, or early
    /// when the multiplexer goes away.
    pub async fn run(self) {
        log::info!(
            "waiting {} seconds before starting comparison",
            self.lead_time_secs
        );
        time::sleep(Duration::from_secs(self.lead_time_secs)).await;

        for interval in 1..=self.num_intervals {
            time::sleep(Duration::from_secs(self.interval_secs)).await;

            let (done_tx, done_rx) = oneshot::channel();
            let cleared = self
                .commands
                .send(EngineCommand::ClearTrail { done: done_tx })
                .await
                .is_ok()
                && done_rx.await.is_ok();
            if !cleared {
                log::error!("multiplexer stopped before interval {} completed", interval);
                return;
            }

            time::sleep(Duration::from_secs(self.trail_time_secs)).await;

            let (done_tx, done_rx) = oneshot::channel();
            if self
                .commands
                .send(EngineCommand::Report { done: done_tx })
                .await
                .is_err()
            {
                log::error!("multiplexer stopped before interval {} reported", interval);
                return;
            }
            let stats = match done_rx.await {
                Ok(stats) => stats,
                Err(_) => {
                    log::error!("multiplexer stopped before interval {} reported", interval);
                    return;
                }
            };

            println!(
                "-----------------------------------------------------\n\
                 Interval ({}/{}): {} seconds.\n\
                 End time: {}\n\
                 Minimum gas price: {}\n\
                 {}",
                interval,
                self.num_intervals,
                self.interval_secs,
                Utc::now().format(TIMESTAMP_FORMAT),
                self.min_price_gwei.unwrap_or(0.0),
                stats,
            );

            if interval == self.num_intervals {
                println!(
                    "{} of {} intervals complete. Exiting.\n",
                    interval, self.num_intervals
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers every command so the controller can run through its phases.
    fn spawn_responder(mut rx: mpsc::Receiver<EngineCommand>) -> tokio::task::JoinHandle<(usize, usize)> {
        tokio::spawn(async move {
            let mut clears = 0;
            let mut reports = 0;
            while let Some(command) = rx.recv().await {
                match command {
                    EngineCommand::ClearTrail { done } => {
                        clears += 1;
                        let _ = done.send(());
                    }
                    EngineCommand::Report { done } => {
                        reports += 1;
                        let _ = done.send(format!("stats for report {}", reports));
                    }
                }
            }
            (clears, reports)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_clear_and_one_report_per_interval() {
        let (tx, rx) = mpsc::channel(8);
        let responder = spawn_responder(rx);

        let controller = IntervalController {
            commands: tx,
            lead_time_secs: 5,
            interval_secs: 10,
            trail_time_secs: 3,
            num_intervals: 2,
            min_price_gwei: None,
        };
        controller.run().await;

        let (clears, reports) = responder.await.unwrap();
        assert_eq!(clears, 2);
        assert_eq!(reports, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_early_when_multiplexer_is_gone() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let controller = IntervalController {
            commands: tx,
            lead_time_secs: 0,
            interval_secs: 1,
            trail_time_secs: 1,
            num_intervals: 3,
            min_price_gwei: None,
        };
        // Must not hang on the closed channel.
        controller.run().await;
    }
}
