use super::load;

pub fn run(tab: &str) -> anyhow::Result<()> {
    let ctx = load()?;
    if ctx.browser.close(tab)? {
        println!("Closed tab '{}'", tab);
    } else {
        println!("No tab named '{}'", tab);
    }
    Ok(())
}
