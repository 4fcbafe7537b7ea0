//! Walkthrough of windows, bans and escalation for the rampart crate.

use rampart::{
    format_ban_duration, Clock, ManualClock, ProgressiveRateLimiter, ProgressiveRateLimiterBuilder,
    RateLimitConfig,
};

fn main() {
    println!("=== Progressive Rate Limiter Example ===\n");

    // Example 1: Filling a window
    window_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: Climbing the ban ladder
    escalation_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: Forgetting old violations
    memory_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 4: Housekeeping and stats
    sweep_example();
}

fn window_example() {
    println!("1. Sliding Window:");

    let clock = ManualClock::new(0);
    let limiter = ProgressiveRateLimiterBuilder::new()
        .window_ms(1_000)
        .max_requests(5)
        .build_manual(clock.clone())
        .unwrap();

    println!("   Created limiter allowing 5 requests per second");

    for i in 1..=7 {
        let decision = limiter.check_rate_limit("192.168.1.10");
        if decision.allowed {
            println!("   Request {} - ✅ Allowed ({} left)", i, decision.remaining);
        } else {
            println!(
                "   Request {} - ❌ Denied: {}",
                i,
                decision.message.unwrap_or_default()
            );
        }
        clock.advance_ms(100);
    }
}

fn escalation_example() {
    println!("2. Ban Escalation:");

    let clock = ManualClock::new(0);
    let limiter =
        ProgressiveRateLimiter::without_sweeper(RateLimitConfig::new(1_000, 3), clock.clone())
            .unwrap();

    for round in 1..=7 {
        let ban = loop {
            let decision = limiter.check_rate_limit("10.0.0.66");
            if let Some(ban) = decision.ban_info {
                break ban;
            }
        };
        println!(
            "   Violation {} - level {}/{} for {}",
            round,
            ban.level,
            limiter.config().max_ban_level,
            format_ban_duration(ban.ban_until - clock.now_ms())
        );
        clock.set_ms(ban.ban_until);
    }
}

fn memory_example() {
    println!("3. Escalation Memory:");

    let clock = ManualClock::new(0);
    let config = RateLimitConfig::new(1_000, 1).with_escalation_window_ms(3_600_000);
    let limiter = ProgressiveRateLimiter::without_sweeper(config, clock.clone()).unwrap();

    limiter.check_rate_limit("client");
    let first = limiter.check_rate_limit("client").ban_info.unwrap();
    println!("   First violation -> level {}", first.level);

    clock.advance_ms(10 * 60_000);
    limiter.check_rate_limit("client");
    let second = limiter.check_rate_limit("client").ban_info.unwrap();
    println!("   10 minutes later -> level {}", second.level);

    clock.advance_ms(2 * 3_600_000);
    limiter.check_rate_limit("client");
    let third = limiter.check_rate_limit("client").ban_info.unwrap();
    println!("   2 hours of quiet later -> level {} (memory expired)", third.level);
}

fn sweep_example() {
    println!("4. Sweeping and Statistics:");

    let clock = ManualClock::new(0);
    let config = RateLimitConfig::new(1_000, 2).with_max_cache_entries(50);
    let limiter = ProgressiveRateLimiter::without_sweeper(config, clock.clone()).unwrap();

    for i in 0..80 {
        let identity = format!("172.16.0.{}", i);
        for _ in 0..3 {
            limiter.check_rate_limit(&identity);
        }
    }
    println!("   Entries after traffic: {}", limiter.stats().entries);

    let report = limiter.sweep();
    println!(
        "   Sweep: forced={} removed={} entries {} -> {}",
        report.forced, report.removed, report.entries_before, report.entries_after
    );

    clock.advance_ms(2_000);
    let report = limiter.sweep();
    println!(
        "   Sweep: forced={} removed={} entries {} -> {}",
        report.forced, report.removed, report.entries_before, report.entries_after
    );

    println!("\n{}", limiter.stats());
}
