use clap::Parser;

use harrow_eval::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	harrow_eval::run(args).await
}
