use std::net::{IpAddr, Ipv4Addr};
use rampart::{client_identity, Admission, AdmissionGate, PathScope, ProgressiveRateLimiterBuilder};
use std::sync::Arc;

fn main() {
    let limiter = Arc::new(
        ProgressiveRateLimiterBuilder::new()
            .window_ms(60_000)
            .max_requests(5)
            .build(),
    );
    let gate = AdmissionGate::new(limiter.clone(), PathScope::new(["/api/", "/auth/"]));

    // Simulate requests from different clients, some behind a proxy
    let requests = vec![
        (None, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))),
        (Some("203.0.113.9, 10.0.0.1"), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
        (None, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 3))),
    ];

    for (forwarded_for, peer) in &requests {
        let identity = client_identity(*forwarded_for, Some(*peer));
        for i in 1..=7 {
            match gate.evaluate("/api/orders", &identity) {
                Admission::Unscoped => println!("{} - Request {} not limited", identity, i),
                Admission::Proceed { headers } => {
                    println!(
                        "{} - Request {} allowed ({} left, resets {})",
                        identity, i, headers.remaining, headers.reset
                    );
                }
                Admission::Reject { status, body, .. } => match body.to_json() {
                    Ok(json) => println!("{} - Request {} BLOCKED {} {}", identity, i, status, json),
                    Err(e) => println!("{} - Request {} BLOCKED {} ({})", identity, i, status, e),
                },
            }
        }
        println!();
    }

    // Static assets bypass the limiter entirely
    println!("{:?}", gate.evaluate("/static/logo.png", "192.168.1.1"));

    println!("\n{}", limiter.stats().summary());
    limiter.destroy();
}
