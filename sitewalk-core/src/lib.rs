use colored::Colorize;

pub mod report;
pub mod resolve;

pub fn print_banner() {
    let banner = r#"
       _ __                    ____
  ___ (_) /____ _    _____ _  / / /__
 (_-</ / __/ -_) |/|/ / _ `/ / /  '_/
/___/_/\__/\__/|__,__/\_,_/ /_/_/\_\
"#;
    eprintln!("{}", banner.bright_cyan().bold());
    eprintln!(
        "  {} {}\n",
        "sitewalk".bright_white().bold(),
        format!("v{} - sitemap index resolver", env!("CARGO_PKG_VERSION")).bright_black()
    );
}
