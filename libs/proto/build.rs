use std::env;
use std::io::Result;
use std::path::PathBuf;

fn main() -> Result<()> {
    // Generated sources are committed under src/gen so a clean checkout builds
    // without protoc. Set SALVOR_PROTO_REGEN=1 to refresh them.
    println!("cargo:rerun-if-env-changed=SALVOR_PROTO_REGEN");
    if env::var_os("SALVOR_PROTO_REGEN").is_none() {
        return Ok(());
    }

    let proto_root = PathBuf::from("../../api/proto");

    let protos = ["salvor/agent/v1/agent.proto"];

    let proto_paths: Vec<PathBuf> = protos.iter().map(|p| proto_root.join(p)).collect();

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/gen")
        .compile_protos(&proto_paths, &[&proto_root])?;

    for proto in &protos {
        println!(
            "cargo:rerun-if-changed={}",
            proto_root.join(proto).display()
        );
    }

    Ok(())
}
