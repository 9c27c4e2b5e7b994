use prost::Message;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    let file_descriptor_set = protox::compile(["proto/farcall.proto"], ["proto"])?;

    let descriptor_set_path = out_dir.join("farcall_descriptor.bin");
    std::fs::write(&descriptor_set_path, file_descriptor_set.encode_to_vec())?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(&descriptor_set_path)
        .compile_fds(file_descriptor_set)?;

    println!("cargo:rerun-if-changed=proto/farcall.proto");
    Ok(())
}
