use std::env;

fn main() {
	println!("cargo:rerun-if-changed=linker.ld");

	// Host builds (tests) link normally; only the bare-metal image needs
	// the kernel layout.
	if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
		return;
	}

	let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR");
	println!("cargo:rustc-link-search=native={}", manifest_dir);
	println!("cargo:rustc-link-arg-bin=kernel8=-Tlinker.ld");
}
