use std::{collections::BTreeMap, env, fs, path::PathBuf};

/// One generated constant: `[type, value]` in `flags.json`.
type Flag = (String, String);

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();
    let flags_str = fs::read_to_string(PathBuf::from(manifest_dir).join("flags.json")).unwrap();
    let sections: BTreeMap<String, BTreeMap<String, Flag>> =
        serde_json::from_str(&flags_str).unwrap();
    let path = PathBuf::from(out_dir).join("build_flags.rs");
    fs::write(path, make_flags(&sections)).unwrap();
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=flags.json");
}

fn make_flags(sections: &BTreeMap<String, BTreeMap<String, Flag>>) -> String {
    let mut s = String::new();
    for (section, flags) in sections {
        s += format!("pub mod {} {{\n", section).as_str();
        for (key, (ty, value)) in flags {
            s += format!("    pub const {}: {} = {};\n", key, ty, value).as_str();
        }
        s += "}\n";
    }
    s
}
