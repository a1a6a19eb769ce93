//! Output rendering for registryctl.

use chrono::{DateTime, Local, Utc};
use registry_core::{AgentDescriptor, HealthStatus};

use crate::client::{DiscoveredAgent, HealthReport, SemanticAgent};

/// Print agents in tabular format.
pub fn print_agent_list(agents: &[AgentDescriptor]) {
    if agents.is_empty() {
        println!("No agents found.");
        return;
    }

    println!(
        "{:<28}  {:<24}  {:<16}  {:<10}  {:<7}",
        "PATH", "NAME", "VISIBILITY", "TRUST", "ENABLED"
    );
    println!("{}", "-".repeat(93));

    for agent in agents {
        println!(
            "{:<28}  {:<24}  {:<16}  {:<10}  {:<7}",
            truncate(&agent.path, 28),
            truncate(&agent.name, 24),
            agent.visibility.as_str(),
            agent.trust_level.as_str(),
            if agent.enabled { "yes" } else { "no" },
        );
    }

    println!();
    println!("{} agent(s)", agents.len());
}

/// Print one agent in detail.
pub fn print_agent_details(agent: &AgentDescriptor) {
    println!("Agent: {}", agent.path);
    println!();
    println!("  Name:           {}", agent.name);
    if !agent.description.is_empty() {
        println!("  Description:    {}", agent.description);
    }
    println!("  URL:            {}", agent.url);
    println!("  Owner:          {}", agent.owner);
    println!("  Visibility:     {}", agent.visibility.as_str());
    if !agent.allowed_groups.is_empty() {
        println!("  Groups:         {}", agent.allowed_groups.join(", "));
    }
    println!("  Trust:          {}", agent.trust_level.as_str());
    println!("  Stars:          {}", agent.num_stars);
    println!("  Enabled:        {}", agent.enabled);
    println!("  Registered:     {}", format_time(&agent.registered_at));
    if !agent.tags.is_empty() {
        println!("  Tags:           {}", agent.tags.join(", "));
    }

    if !agent.skills.is_empty() {
        println!();
        println!("  Skills:");
        for skill in &agent.skills {
            match &skill.description {
                Some(desc) => println!("    {:<24}  {}", skill.id, truncate(desc, 60)),
                None => println!("    {}", skill.id),
            }
        }
    }
}

/// Print skill discovery results.
pub fn print_discovered(agents: &[DiscoveredAgent]) {
    if agents.is_empty() {
        println!("No matching agents.");
        return;
    }

    println!("{:<6}  {:<28}  {:<24}  {:<30}", "SCORE", "PATH", "NAME", "MATCHED");
    println!("{}", "-".repeat(94));

    for found in agents {
        println!(
            "{:<6.2}  {:<28}  {:<24}  {:<30}",
            found.relevance_score,
            truncate(&found.agent.path, 28),
            truncate(&found.agent.name, 24),
            truncate(&found.matched_skills.join(","), 30),
        );
    }
}

/// Print semantic discovery results.
pub fn print_semantic(agents: &[SemanticAgent]) {
    if agents.is_empty() {
        println!("No matching agents.");
        return;
    }

    println!("{:<6}  {:<28}  {:<24}", "SCORE", "PATH", "NAME");
    println!("{}", "-".repeat(62));

    for found in agents {
        println!(
            "{:<6.2}  {:<28}  {:<24}",
            found.score,
            truncate(&found.agent.path, 28),
            truncate(&found.agent.name, 24),
        );
    }
}

/// Print a probe result.
pub fn print_health(report: &HealthReport) {
    let status = match report.result.status {
        HealthStatus::Healthy => "HEALTHY",
        HealthStatus::Unhealthy => "UNHEALTHY",
    };
    println!("{}: {}", report.agent_path, status);
    println!("  Ping URL:       {}", report.ping_url);
    if let Some(code) = report.result.status_code {
        println!("  Status code:    {}", code);
    }
    if let Some(ms) = report.result.response_time_ms {
        println!("  Response time:  {}ms", ms);
    }
    if let Some(detail) = &report.result.detail {
        println!("  Detail:         {}", detail);
    }
    println!("  Checked:        {}", format_time(&report.result.checked_at));
}

fn format_time(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
