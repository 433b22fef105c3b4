use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = harrow_api::Args::parse();

	harrow_api::run(args).await
}
