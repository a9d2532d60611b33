use verbtab_browse::Planner;

use super::load;

/// Report what works and what is missing.
pub async fn run() -> anyhow::Result<()> {
    let ctx = load()?;

    println!();
    println!("verbtab doctor");
    println!("==============");
    println!();

    let mut err_count = 0u32;

    println!("Configuration");
    let config_path = ctx.paths.config_file();
    if config_path.exists() {
        print_ok("Config file", &config_path.display().to_string());
    } else {
        print_warn("No config file", "defaults and environment variables are used");
    }
    let tabs_dir = ctx.paths.tabs_dir();
    match ctx.browser.store().list() {
        Ok(names) => print_ok("Tab store", &format!("{} ({} tabs)", tabs_dir.display(), names.len())),
        Err(e) => {
            print_err("Tab store unreadable", &e.to_string());
            err_count += 1;
        }
    }
    println!();

    println!("Fetcher");
    let fetcher = ctx.browser.fetcher();
    if fetcher.check_installed() {
        print_ok("Backend ready", fetcher.name());
    } else {
        print_err(
            "Backend not installed",
            &format!("{} ({})", fetcher.name(), ctx.config.fetcher.lynx_binary),
        );
        err_count += 1;
    }
    println!();

    println!("Planner");
    if ctx.planner.is_available() {
        print_ok("Planner ready", ctx.planner.model().unwrap_or(""));
    } else {
        print_warn(
            "Planner unavailable",
            ctx.planner.unavailable_reason().unwrap_or("not configured"),
        );
        println!("  Only links with a direct target can be executed.");
    }
    println!();

    if err_count > 0 {
        anyhow::bail!("{} problem(s) found", err_count);
    }
    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {}: {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {}: {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {}: {}", label, hint);
    }
}
