use clap::Parser;
use mesh_cli::cli::ProxyArgs;
use mesh_protocol::GroupProxy;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = ProxyArgs::parse();
    let _guard = mesh_cli::init_logging(args.log.dir(), &args.log_file())?;

    let proxy = GroupProxy::bind(args.config()).await?;
    eprintln!(
        "mesh-proxy {} listening on {}, hub {}:{}",
        proxy.identity(),
        proxy.local_addr(),
        args.root_host,
        args.root_port
    );

    let (handle, task) = proxy.spawn();
    mesh_cli::run_until_interrupted(task, || async move { handle.shutdown().await }).await
}
