use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use toyverse::filters::{FacetValue, FilterSpec, PieceRange};
use toyverse::prelude::*;

/// Browse a ToyVerse catalog from the terminal
#[derive(Parser, Debug)]
#[clap(name = "toyverse", version, about)]
struct Args {
    /// Account email
    #[clap(long, env = "TOYVERSE_EMAIL")]
    email: String,

    /// Account password
    #[clap(long, env = "TOYVERSE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Theme slug; lists the themes when omitted
    theme: Option<String>,

    /// Category to include (repeatable)
    #[clap(long = "category")]
    categories: Vec<String>,

    /// Studio to include (repeatable)
    #[clap(long = "studio")]
    studios: Vec<String>,

    /// Piece range: 0-200, 201-500, 501-1000, 1001-1999 or 2000+
    #[clap(long)]
    pieces: Option<PieceRange>,

    /// Release year
    #[clap(long)]
    year: Option<i32>,

    /// Only exposed (yes) or stored (no) toys
    #[clap(long, parse(try_from_str = parse_flag))]
    exposed: Option<bool>,

    /// Only wishlist (yes) or owned (no) toys
    #[clap(long, parse(try_from_str = parse_flag))]
    wishlist: Option<bool>,

    /// added_asc, added_desc, release_asc or release_desc
    #[clap(long)]
    sort: Option<ToySort>,

    /// Name or number contains this text
    #[clap(long)]
    search: Option<String>,

    /// Page to show
    #[clap(long, default_value = "1")]
    page: usize,
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        other => Err(format!("expected yes or no, got {:?}", other)),
    }
}

impl Args {
    fn filters(&self) -> FilterSpec {
        FilterSpec {
            categories: self.categories.iter().cloned().collect(),
            studios: self.studios.iter().cloned().collect(),
            pieces: self.pieces,
            release_year: self.year,
            exposed: self.exposed,
            wishlist: self.wishlist,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let args = Args::parse();
    let config = SupabaseConfig::from_env()?;
    let options = ClientOptions::from_env()?;
    let toyverse = ToyVerse::new(&config, options)?;

    let auth = toyverse.auth().context("client has no auth backend")?;
    let session = auth
        .sign_in_with_password(&args.email, &args.password)
        .await
        .context("sign-in failed")?;
    debug!("session expires in {}s", session.expires_in);

    let slug = match &args.theme {
        Some(slug) => slug,
        None => {
            for theme in toyverse.list_themes().await? {
                println!("{:<32} {}", theme.slug(), theme.name);
            }
            return Ok(());
        }
    };

    let theme = toyverse.theme_by_slug(slug).await?;
    let mut view = toyverse.open_theme(theme);
    view.set_sort(args.sort);
    if let Some(search) = &args.search {
        view.set_search(search);
    }
    if view.replace_filters(args.filters()).await == Refresh::Failed {
        let snapshot = view.engine().snapshot().await;
        anyhow::bail!(
            "could not load toys: {}",
            snapshot.last_error.unwrap_or_default()
        );
    }
    view.go_to_page(args.page).await;

    let page = view.page().await;
    print_page(view.theme(), &page);
    Ok(())
}

fn print_page(theme: &Theme, page: &GridPage) {
    println!(
        "{} - page {}/{} ({} of {} toys)",
        theme.name,
        page.page,
        page.total_pages.max(1),
        page.total_items,
        page.counts.total
    );
    println!();

    for card in &page.cards {
        let toy = &card.toy;
        println!(
            "{:>8}  {:<40} {:>6}  {}",
            toy.number.as_deref().unwrap_or("-"),
            toy.name,
            toy.nb_pieces.map(|n| n.to_string()).unwrap_or_default(),
            card.image_url.as_deref().unwrap_or("(no image)")
        );
    }

    println!();
    for value in page.facets.all_values() {
        let count = page.counts.get(&value);
        if count > 0 {
            println!("  {:<24} {}", facet_label(&value), count);
        }
    }
}

fn facet_label(value: &FacetValue) -> String {
    match value {
        FacetValue::Category(category) => format!("category {}", category),
        FacetValue::Studio(studio) => format!("studio {}", studio),
        FacetValue::Pieces(range) => format!("pieces {}", range),
        FacetValue::ReleaseYear(year) => format!("year {}", year),
        FacetValue::Exposed(flag) => format!("exposed {}", if *flag { "yes" } else { "no" }),
        FacetValue::Wishlist(flag) => format!("wishlist {}", if *flag { "yes" } else { "no" }),
    }
}
