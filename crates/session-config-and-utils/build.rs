fn main() {
    // Compile-time default for `DEFAULT_API_URL`.
    println!("cargo:rerun-if-env-changed=SESSION_GUARD_API_URL");
}
