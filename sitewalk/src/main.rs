use colored::Colorize;
use sitewalk::commands::command_argument_builder;
use sitewalk::handlers::{handle_resolve, handle_serve, init_tracing};
use sitewalk_core::print_banner;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let outcome = match chosen_command.subcommand() {
        Some(("resolve", primary_command)) => {
            init_tracing("warn");
            handle_resolve(primary_command).await
        }
        Some(("serve", primary_command)) => {
            init_tracing("info");
            handle_serve(primary_command).await
        }
        // No subcommand provided, just show the banner
        None => return,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
