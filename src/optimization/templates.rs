//! Static implementation guides, examples and cost figures for advisor rules

use crate::optimization::advisor::{CostBenefit, Effort, Risk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub guide: &'static str,
    pub example: &'static str,
}

pub fn template_for(rule: &str) -> Option<Template> {
    let template = match rule {
        "reduce_allocation_rate" => Template {
            guide: "Profile the hottest update paths and move temporary allocations out of per-frame code. \
                    Cache results that are recomputed every tick.",
            example: "// before: let names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();\n\
                      // after: reuse a scratch buffer owned by the system\n\
                      scratch.clear();\n\
                      scratch.extend(items.iter().map(|i| i.name.as_str()));",
        },
        "preallocate_buffers" => Template {
            guide: "Size buffers for the burst up front and keep them alive between bursts instead of \
                    growing them on demand.",
            example: "let mut events = Vec::with_capacity(expected_burst);\n\
                      // refill with events.clear() between bursts",
        },
        "reduce_native_allocations" => Template {
            guide: "Pool native buffers, textures and meshes. Release native handles deterministically \
                    when their owner is destroyed.",
            example: "let buffer = native_pool.acquire(size);\n\
                      // ... use buffer ...\n\
                      native_pool.release(buffer);",
        },
        "cap_object_counts" => Template {
            guide: "Put an upper bound on every spawner and registry. Recycle the oldest entries when the \
                    bound is reached.",
            example: "if live.len() >= MAX_LIVE {\n    recycle(live.pop_front());\n}\nlive.push_back(spawn());",
        },
        "reduce_collection_pressure" => Template {
            guide: "Collections run because short-lived garbage piles up. Replace per-call allocations on \
                    hot paths with reused objects.",
            example: "thread_local! { static SCRATCH: RefCell<String> = RefCell::new(String::new()); }",
        },
        "schedule_incremental_collection" => Template {
            guide: "Spread collection work over idle frames or loading screens rather than paying for a \
                    full collection under load.",
            example: "if frame_budget.remaining() > Duration::from_millis(2) {\n    gc.collect_incremental();\n}",
        },
        "align_collection_with_cycles" => Template {
            guide: "Usage repeats on a fixed period. Trigger collection and cache expiry at the low point \
                    of the cycle.",
            example: "if cycle.phase() == Phase::Trough {\n    caches.purge_expired();\n}",
        },
        "fix_confirmed_leak" => Template {
            guide: "Diff object counts between snapshots taken minutes apart to find the growing \
                    category, then audit who holds references to it.",
            example: "let growth = after.object_counts[\"entities\"] - before.object_counts[\"entities\"];",
        },
        "unload_idle_resources" => Template {
            guide: "Track last-use time for loaded resources and unload those idle past a threshold.",
            example: "resources.retain(|r| r.last_used.elapsed() < IDLE_LIMIT);",
        },
        "raise_memory_budget" => Template {
            guide: "Emergency mode was entered. Either raise the memory budget for this device class or \
                    cut the steady-state footprint so normal operation stays well below it.",
            example: "[cleanup]\nemergency_threshold_mb = 3072.0",
        },
        "improve_cleanup_effectiveness" => Template {
            guide: "Cleanup runs keep freeing almost nothing. Register host collaborators for pools and \
                    caches, or disable operations that cannot release memory in this host.",
            example: "let host = HostCollaborators::new().with_caches(Arc::new(my_caches));",
        },
        "audit_event_subscriptions" => Template {
            guide: "Leak-shaped growth has been seen but not confirmed. Check that every subscription is \
                    removed when its subscriber goes away.",
            example: "impl Drop for Listener {\n    fn drop(&mut self) { self.bus.unsubscribe(self.id); }\n}",
        },
        "decouple_memory_from_frame_rate" => Template {
            guide: "Memory moves with a tracked component and frame rate is low. Bound the component's \
                    per-update storage.",
            example: "history.truncate(MAX_HISTORY);",
        },
        _ => return None,
    };
    Some(template)
}

/// Hours of work for an effort tier
pub fn estimated_hours(effort: Effort) -> f64 {
    match effort {
        Effort::Low => 2.0,
        Effort::Medium => 8.0,
        Effort::High => 24.0,
    }
}

fn risk_penalty(risk: Risk) -> f64 {
    match risk {
        Risk::Low => 0.0,
        Risk::Medium => 0.5,
        Risk::High => 1.0,
    }
}

pub fn cost_benefit(effort: Effort, risk: Risk, benefit_mb: f64) -> CostBenefit {
    let hours = estimated_hours(effort);
    let benefit_per_hour = benefit_mb / hours;
    CostBenefit {
        estimated_hours: hours,
        benefit_per_hour,
        payback_score: benefit_per_hour / (1.0 + risk_penalty(risk)),
    }
}
