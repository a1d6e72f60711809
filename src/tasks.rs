use actix_web::{rt, web};
use chrono::Utc;
use std::time::Duration;

use crate::config::Config;
use crate::helper::sync_helpers::sync_remote_galleries;
use crate::AppState;

const VISITOR_SWEEP_SECS: u64 = 60;

/// Spawns the periodic jobs on the current actix runtime.
pub fn spawn_background_tasks(state: web::Data<AppState>, config: &Config) {
    // Visitor sweep
    let s = state.clone();
    rt::spawn(async move {
        loop {
            rt::time::sleep(Duration::from_secs(VISITOR_SWEEP_SECS)).await;
            let removed = s.visitor_stats.sweep_at(Utc::now());
            if removed > 0 {
                log::debug!("[task] Pruned {} inactive visitor(s)", removed);
            }
        }
    });

    // Gallery sync
    let interval = config.gallery_sync_interval_minutes;
    if interval == 0 {
        log::info!("[task] Periodic gallery sync disabled");
        return;
    }
    let Some(base_url) = config.server_base_url.clone() else {
        log::warn!("[task] GALLERY_SYNC_INTERVAL_MINUTES is set but SERVER_BASE_URL is not; gallery sync disabled");
        return;
    };
    let cache_path = config.gallery_cache_path();
    log::info!("[task] Syncing galleries from {} every {} minute(s)", base_url, interval);
    rt::spawn(async move {
        loop {
            match sync_remote_galleries(&state.remote, Some(&base_url), &cache_path).await {
                Ok(report) => log::info!(
                    "[task] Gallery sync: {} galleries, {} files",
                    report.gallery_count,
                    report.file_count
                ),
                Err(e) => log::error!("[task] Gallery sync failed: {}", e),
            }
            rt::time::sleep(Duration::from_secs(interval * 60)).await;
        }
    });
}
