use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tell Cargo to rerun if the proto files change
    println!("cargo:rerun-if-changed=../proto/v1/viesti.proto");

    // The generated code is committed under src/proto; regenerate only when
    // protoc is present so builds work without the protobuf toolchain.
    let protoc = std::env::var("PROTOC").unwrap_or_else(|_| "protoc".to_string());
    if Command::new(&protoc).arg("--version").output().is_err() {
        println!("cargo:warning=protoc not found, using committed generated code");
        return Ok(());
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/proto")
        .compile_protos(&["../proto/v1/viesti.proto"], &["../proto"])?;

    Ok(())
}
