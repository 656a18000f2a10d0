
use std::{collections::HashMap, env, fs, path::PathBuf};

fn main(){

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let board = env::var("BOARD").unwrap_or_else(|_| String::from("virt"));
    let flags_str = fs::read_to_string(PathBuf::from(manifest_dir.clone()).join("board.json")).unwrap();
    let flagmap: HashMap<String,HashMap<String,String>> = serde_json::from_str(&flags_str).unwrap();
    let flags = match flagmap.get(board.as_str()){
        Some(value) => value,
        None => panic!("Unknown board.")
    };
    make_flags(flags);
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=board.json");
    println!("cargo:rerun-if-env-changed=BOARD");
}


fn make_flags(flagmap: &HashMap<String,String>){
    let mut s: String = String::from("");
    s+="#![allow(dead_code)]\n";
    for key in flagmap.keys() {
        s += format!("pub const {}: u64 = {};\n",key,flagmap.get(key).unwrap()).as_str();
    }
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let path = PathBuf::from(manifest_dir.clone()).join("src/board_flags.rs");
    fs::write(path,s).unwrap();
}
