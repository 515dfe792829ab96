use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("wsrecv {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: wsrecv");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("WSRECV_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("window_size: {}", wsrecv_conn::WINDOW_SIZE);
    println!("default_read_limit: {}", wsrecv_conn::DEFAULT_READ_LIMIT);
    println!("features: cli=true, permessage-deflate=true");

    Ok(SUCCESS)
}
