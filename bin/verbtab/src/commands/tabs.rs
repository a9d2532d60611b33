use super::{load, print_json};

pub fn run(json: bool) -> anyhow::Result<()> {
    let ctx = load()?;
    let tabs = ctx.browser.tabs()?;
    if json {
        return print_json(&tabs);
    }

    if tabs.is_empty() {
        println!("No tabs. Open one with `verbtab open <tab> <url>`.");
        return Ok(());
    }
    let width = tabs.keys().map(|n| n.len()).max().unwrap_or(0);
    for (name, tab) in &tabs {
        println!(
            "{:<width$}  {}  (updated {})",
            name,
            tab.current_url,
            tab.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}
