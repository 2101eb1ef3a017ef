fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    // Version string for the startup banners. Builds without git metadata
    // report "unknown".
    let describe = std::process::Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string());

    println!(
        "cargo:rustc-env=GIT_VERSION={}",
        describe.as_deref().unwrap_or("unknown")
    );
}
