//! Fills in country, browser, OS and device details of recorded visitors.

use crate::geo::{find_country_by_ip, GeoLocator};
use crate::stats_store::{Visitor, VisitorQuery};
use crate::tasks::{TaskContext, TaskHandler, TaskOutcome};
use crate::user_agent::UserAgent;
use chrono::Utc;
use tracing::debug;

pub const ALIAS: &str = "StatsVisitorEnhanceTask";

/// Visitors processed per run; bounds the geo lookups a single run performs.
pub const BATCH_SIZE: usize = 10;

pub struct StatsVisitorEnhanceTask;

impl TaskHandler for StatsVisitorEnhanceTask {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn title(&self) -> &'static str {
        "Stats Visitor Enhance"
    }

    fn description(&self) -> &'static str {
        "Enhances the visitor stats by adding the country"
    }

    fn handle(&self, ctx: &mut TaskContext) -> TaskOutcome {
        let services = ctx.services().clone();
        let Some(stats_store) = services.stats_store.clone() else {
            ctx.log_error("Task StatsVisitorEnhance. Store is nil");
            return TaskOutcome::failed("stats store is not configured");
        };

        let visitors = match stats_store.visitor_list(&VisitorQuery::not_enhanced(BATCH_SIZE)) {
            Ok(visitors) => visitors,
            Err(e) => {
                ctx.log_error(format!("Task StatsVisitorEnhance. Error: {}", e));
                return TaskOutcome::failed(e.to_string());
            }
        };

        if visitors.is_empty() {
            ctx.log_info("Task StatsVisitorEnhance. No entries to process");
            return TaskOutcome::Succeeded;
        }

        ctx.log_info(format!(
            "Task StatsVisitorEnhance. Found: {} entries to process",
            visitors.len()
        ));

        for mut visitor in visitors.into_iter().take(BATCH_SIZE) {
            enhance(&mut visitor, services.geo_locator.as_ref());
            // A failed row stays unenhanced and is picked up again next run.
            if let Err(e) = stats_store.visitor_update(&visitor) {
                ctx.log_error(format!(
                    "Task StatsVisitorEnhance. Failed to update visitor {}: {}",
                    visitor.id, e
                ));
            }
        }

        // More visitors may be waiting; the schedule runs this again.
        TaskOutcome::Incomplete
    }
}

fn enhance(visitor: &mut Visitor, geo: &dyn GeoLocator) {
    let ua = UserAgent::parse(&visitor.user_agent);
    let country = find_country_by_ip(geo, &visitor.ip_address);
    debug!("Visitor {} resolved to country {}", visitor.id, country);

    visitor.country = country;
    visitor.user_browser = ua.name.clone();
    visitor.user_browser_version = ua.version.clone();
    visitor.user_device = ua.device.clone();
    visitor.user_device_type = ua.device_type().to_string();
    visitor.user_os = ua.os.clone();
    visitor.user_os_version = ua.os_version.clone();
    visitor.updated_at = Utc::now();
}
