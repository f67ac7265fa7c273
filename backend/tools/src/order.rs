//! Order tracking with deterministic, per-order simulated status.

use anyhow::bail;
use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sonicdesk_core::{Tool, ToolOutput};

const STATUSES: [(&str, u32); 8] = [
    ("Order received", 10),
    ("Processing", 15),
    ("Preparing for shipment", 15),
    ("Shipped", 20),
    ("In transit", 20),
    ("Out for delivery", 10),
    ("Delivered", 5),
    ("Delayed", 3),
];

/// Simulated tracking snapshot for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatus {
    pub status: &'static str,
    pub estimated_delivery: NaiveDate,
}

fn seed_for(order_id: &str) -> u64 {
    let digest = Sha256::digest(order_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Status for `order_id` as seen on `today`. The same id always yields the
/// same status and delivery offset.
pub fn simulate_status(order_id: &str, today: NaiveDate) -> OrderStatus {
    let mut rng = StdRng::seed_from_u64(seed_for(order_id));
    let status = match WeightedIndex::new(STATUSES.iter().map(|(_, w)| *w)) {
        Ok(dist) => STATUSES[dist.sample(&mut rng)].0,
        Err(_) => STATUSES[0].0,
    };
    let days: i64 = match status {
        "Delivered" => -rng.gen_range(0..=3),
        "Out for delivery" => 0,
        _ => rng.gen_range(1..=10),
    };
    OrderStatus {
        status,
        estimated_delivery: today + Duration::days(days),
    }
}

pub struct TrackOrderTool;

impl TrackOrderTool {
    fn output_for(&self, order_id: &str, notify: bool, today: NaiveDate) -> ToolOutput {
        let snapshot = simulate_status(order_id, today);
        let delivery = snapshot.estimated_delivery.format("%Y-%m-%d").to_string();

        let mut model_result = json!({
            "orderStatus": snapshot.status,
            "orderNumber": order_id,
            "estimatedDelivery": delivery,
            "notificationStatus": if notify {
                format!("You will receive notifications for order {order_id}")
            } else {
                String::new()
            },
        });
        let footer = match snapshot.status {
            "In transit" => {
                model_result["currentLocation"] = json!("Distribution Center");
                "Distribution Center"
            }
            "Delivered" => {
                model_result["deliveryLocation"] = json!("Front Door");
                "Front Door"
            }
            "Delayed" => {
                model_result["additionalInfo"] = json!("Weather delays possible");
                "Weather delays possible"
            }
            _ => "",
        };

        let mut ui_result = json!({
            "type": "card",
            "content": {
                "title": format!("Order #{order_id}"),
                "description": format!("Status: {}", snapshot.status),
                "details": {
                    "Estimated Delivery": delivery,
                    "Current Status": snapshot.status,
                },
                "footer": {
                    "text": footer,
                    "action": { "text": "Track Another Order", "url": "#" }
                }
            }
        });
        if notify {
            ui_result["content"]["details"]["Notifications"] = json!("Enabled");
        }

        ToolOutput::new(model_result, ui_result)
    }
}

#[async_trait]
impl Tool for TrackOrderTool {
    fn name(&self) -> &str {
        "trackOrderTool"
    }

    fn description(&self) -> &str {
        "Track the status of an order by order ID"
    }

    fn short_description(&self) -> &str {
        "Tracking an order"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "orderId": {
                    "type": "string",
                    "description": "The order ID to track"
                },
                "requestNotifications": {
                    "type": "boolean",
                    "description": "Whether to request notifications for this order"
                }
            },
            "required": ["orderId"]
        })
    }

    async fn execute(&self, content: Value) -> anyhow::Result<ToolOutput> {
        let order_id = match &content["orderId"] {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => bail!("Missing 'orderId' argument"),
        };
        let notify = content["requestNotifications"].as_bool().unwrap_or(false);
        Ok(self.output_for(&order_id, notify, Local::now().date_naive()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn status_is_deterministic_per_order() {
        let a = simulate_status("A-1001", day());
        let b = simulate_status("A-1001", day());
        assert_eq!(a, b);
        assert!(STATUSES.iter().any(|(s, _)| *s == a.status));
    }

    #[test]
    fn delivery_offset_matches_status() {
        for id in ["1", "2", "3", "42", "order-x", "ZZZ-999", "abc", "7777"] {
            let snap = simulate_status(id, day());
            let offset = (snap.estimated_delivery - day()).num_days();
            match snap.status {
                "Delivered" => assert!((-3..=0).contains(&offset)),
                "Out for delivery" => assert_eq!(offset, 0),
                _ => assert!((1..=10).contains(&offset)),
            }
        }
    }

    #[test]
    fn notifications_flag_shows_up_in_both_results() {
        let out = TrackOrderTool.output_for("55", true, day());
        assert_eq!(out.model_result["orderNumber"], "55");
        assert_eq!(
            out.model_result["notificationStatus"],
            "You will receive notifications for order 55"
        );
        let ui = out.ui_result.unwrap();
        assert_eq!(ui["content"]["title"], "Order #55");
        assert_eq!(ui["content"]["details"]["Notifications"], "Enabled");
    }

    #[tokio::test]
    async fn missing_order_id_fails() {
        assert!(TrackOrderTool.execute(json!({})).await.is_err());
        assert!(TrackOrderTool.execute(json!({"orderId": "  "})).await.is_err());
        let ok = TrackOrderTool.execute(json!({"orderId": 1234})).await.unwrap();
        assert_eq!(ok.model_result["orderNumber"], "1234");
    }
}
