use verbtab_browse::{DiscoverOptions, Outcome, PlanSource};

use super::{describe_source, load, print_json, print_verbs};

#[derive(Debug, Clone, Copy, Default)]
pub struct VerbsOptions {
    pub planner: bool,
    pub refresh: bool,
    pub json: bool,
}

pub async fn run(tab: &str, verb: Option<&str>, child: Option<&str>, opts: VerbsOptions) -> anyhow::Result<()> {
    let ctx = load()?;
    // Planner extraction is always a fresh pass.
    let discover = DiscoverOptions {
        bypass_cache: opts.refresh || opts.planner,
        use_planner: opts.planner,
        ..DiscoverOptions::default()
    };

    let Some(verb) = verb else {
        let discovery = ctx.browser.verbs(tab, &discover).await?;
        if opts.json {
            return print_json(&discovery);
        }
        let note = describe_source(&discovery.source);
        match note {
            Some(note) => println!("Verbs for '{}' ({}):", tab, note),
            None => println!("Verbs for '{}':", tab),
        }
        if discovery.verbs.is_empty() {
            println!("  (none)");
        } else {
            print_verbs(&discovery.verbs, 0);
        }
        return Ok(());
    };

    let outcome = ctx.browser.execute(tab, verb, child, &discover).await?;
    if opts.json {
        return print_json(&outcome);
    }

    match outcome {
        Outcome::Listed { container } => {
            println!("{} is a group; run one of:", container.name);
            print_verbs(container.subverbs(), 0);
        }
        Outcome::Navigated(nav) => {
            let how = match nav.plan_source {
                PlanSource::Deterministic => "direct",
                PlanSource::Cached => "cached plan",
                PlanSource::Planner => "planned",
            };
            println!("{} ({}): {} -> {}", nav.verb, how, nav.from_url, nav.to_url);
            if !nav.plan.description.is_empty() {
                println!("  {}", nav.plan.description);
            }
        }
    }
    Ok(())
}
