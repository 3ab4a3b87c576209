//
//  Sample application.
//
//  Serves an in-memory resource tree on localhost:4918, plain http, no ssl.
//  Connect to http://localhost:4918/
//

use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;

use clap::Parser;
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use dav_engine::{DavHandler, DavMethodSet, events::LogEventListener, memfs::MemFs};

#[derive(Debug, clap::Parser)]
#[clap(about, version)]
struct Cli {
    /// port to listen on
    #[clap(short = 'p', long, default_value = "4918")]
    port: u16,
    /// url prefix the tree is served under
    #[clap(long)]
    prefix: Option<String>,
    /// user with write access, as name:password (repeatable)
    #[clap(short = 'u', long = "user")]
    users: Vec<String>,
    /// user with read access only, as name:password (repeatable)
    #[clap(short = 'r', long = "reader")]
    readers: Vec<String>,
    /// quota in bytes
    #[clap(short = 'q', long)]
    quota: Option<u64>,
    /// gzip textual GET responses
    #[clap(short = 'z', long)]
    compress: bool,
    /// only allow methods that do not modify anything
    #[clap(long)]
    read_only: bool,
}

fn add_users(fs: &MemFs, users: &[String], can_write: bool) -> Result<(), Box<dyn Error>> {
    for u in users {
        let Some((name, password)) = u.split_once(':') else {
            return Err(format!("{}: expected name:password", u).into());
        };
        fs.add_user(name, password, can_write);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Cli::parse();

    let fs = match args.quota {
        Some(q) => MemFs::with_quota(q),
        None => MemFs::new(),
    };
    add_users(&fs, &args.users, true)?;
    add_users(&fs, &args.readers, false)?;

    let mut config = DavHandler::builder()
        .resolver(fs)
        .event_listener(LogEventListener)
        .compression(args.compress);
    if let Some(prefix) = args.prefix {
        config = config.strip_prefix(prefix);
    }
    if args.read_only {
        config = config.methods(DavMethodSet::read_only());
    }
    let dav_server = config.build_handler();

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    println!("Serving memory tree on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let dav_server = dav_server.clone();
        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let dav_server = dav_server.clone();
                async move { Ok::<_, Infallible>(dav_server.handle(req).await) }
            });
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                eprintln!("Failed serving: {err:?}");
            }
        });
    }
}
