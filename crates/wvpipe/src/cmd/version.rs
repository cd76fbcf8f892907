use wvpipe::exit::{CliResult, SUCCESS};

use crate::cmd::VersionArgs;

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("wvpipe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: wvpipe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("WVPIPE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: peer={}, cli=true", cfg!(feature = "peer"));
    println!(
        "protocol: {} {}",
        wvpipe::peer::HandshakeConfig::default().protocol_name,
        wvpipe::peer::HandshakeConfig::default().protocol_version
    );

    Ok(SUCCESS)
}
