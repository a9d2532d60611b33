use super::{load, print_verbs};

pub async fn run(tab: &str, url: &str) -> anyhow::Result<()> {
    let ctx = load()?;
    let opened = ctx.browser.open(tab, url).await?;

    println!("Tab '{}' -> {}", opened.name, opened.tab.current_url);
    if opened.verbs.is_empty() {
        println!("  (no verbs found)");
    } else {
        print_verbs(&opened.verbs, 0);
    }
    Ok(())
}
