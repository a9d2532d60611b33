use super::{describe_source, load, print_json, print_verbs};

pub async fn run(tab: &str, guidance: &str, into: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ctx = load()?;
    let discovery = ctx.browser.refine(tab, guidance, into).await?;
    if json {
        return print_json(&discovery);
    }

    if describe_source(&discovery.source).is_none() {
        anyhow::bail!("no verbs extracted for tab '{}'", tab);
    }
    match into {
        Some(scope) => println!("Refined '{}' in tab '{}':", scope, tab),
        None => println!("Refined tab '{}':", tab),
    }
    if discovery.verbs.is_empty() {
        println!("  (none)");
    } else {
        print_verbs(&discovery.verbs, 0);
    }
    Ok(())
}
