//! 初始化器：按速率向输出库所生成 token。
use std::time::Duration;

use crate::engine::transit::Transit;
use crate::net::core::Net;
use crate::net::ids::NodeRef;
use crate::net::structure::SmartToken;

/// Polls every initializer once at simulation time `now`. `epoch` is the
/// time the current run started and counts as the last generation of an
/// initializer that has not generated yet.
pub fn poll(net: &mut Net, now: Duration, epoch: Duration) -> Vec<Transit> {
    let smart = net.mode().is_smart();
    let mut spawned = Vec::new();
    for (id, initializer) in net.initializers_mut() {
        let (Some(place), Some(interval)) = (initializer.output(), initializer.interval()) else {
            continue;
        };
        if !initializer.has_quota() {
            continue;
        }
        let since = now.saturating_sub(initializer.last_generated.unwrap_or(epoch));
        if since < interval {
            continue;
        }
        initializer.record_generation(now);
        let token = smart.then(|| SmartToken::new(initializer.token_value));
        log::trace!(
            "initializer {} generated token #{} toward {place}",
            initializer.name(),
            initializer.tokens_generated()
        );
        spawned.push(Transit::new(
            NodeRef::Initializer(id),
            NodeRef::Place(place),
            token,
        ));
    }
    spawned
}
