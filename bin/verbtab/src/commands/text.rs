use verbtab_browse::head_lines;

use super::load;

pub async fn run(tab: &str, lines: usize) -> anyhow::Result<()> {
    let ctx = load()?;
    let page = ctx.browser.page(tab).await?;
    println!("{}", head_lines(&page.text, lines));

    let total = page.text.lines().count();
    if total > lines {
        eprintln!("... {} more lines (use --lines to show more)", total - lines);
    }
    Ok(())
}
