//! Collect, parse and store without any subprocess: the objects already
//! contain disassembler output.

use std::fs;
use std::path::Path;

use buildcmp_core::{
    collect_objects, disasm, ArtifactStore, AssumeAnswer, RevisionId, SafetyGuard,
    SectionFingerprint, SectionStore, VolatileFilter,
};

const SQUARE: &str = "
math.o:     file format elf64-x86-64

Disassembly of section .text._Z6squarei:

0000000000000000 <square(int)>:
   0:\tmov    %edi,%eax
   2:\timul   %edi,%eax
   5:\tret

Disassembly of section .rodata.str1.1:

Disassembly of section .text._Z4namev:

0000000000000000 <name()>:
   0:\tmov    $0x0,%eax
\t\t\t1: R_X86_64_32\t.rodata.str1.1+0x8
   5:\tret
";

fn fingerprint(store: &ArtifactStore, rev: &RevisionId, tree: &Path) -> Vec<SectionFingerprint> {
    store.claim_revision(rev).unwrap();
    let objects_dir = store.objects_dir(rev);
    let objects = collect_objects(tree, &objects_dir, ".o").unwrap();
    let sections = store.sections(rev).unwrap();
    let filter = VolatileFilter::elf();

    let mut out = Vec::new();
    for object in &objects {
        let text = fs::read_to_string(objects_dir.join(object)).unwrap();
        for section in disasm::parse(&text, &filter).persistable() {
            out.push(SectionFingerprint {
                object: object.clone(),
                section: section.name.clone(),
                hash: sections.put(&section.text()).unwrap(),
            });
        }
    }
    store.write_index(rev, &out).unwrap();
    out
}

#[test]
fn moved_constants_keep_fingerprints_stable() {
    let scratch = tempfile::tempdir().unwrap();
    let tree = scratch.path().join("tree");
    fs::create_dir_all(tree.join("src/math")).unwrap();
    let store = ArtifactStore::open(
        &scratch.path().join("compare"),
        &SafetyGuard::system_temp(),
        &mut AssumeAnswer(false),
    )
    .unwrap();

    let a: RevisionId = "4b5b263".parse().unwrap();
    fs::write(tree.join("src/math/math.o"), SQUARE).unwrap();
    let first = fingerprint(&store, &a, &tree);

    let b: RevisionId = "d1bc5bf".parse().unwrap();
    fs::write(
        tree.join("src/math/math.o"),
        SQUARE.replace("+0x8", "+0x20"),
    )
    .unwrap();
    let second = fingerprint(&store, &b, &tree);

    // The empty .rodata section is not persisted.
    let names: Vec<_> = first.iter().map(|f| f.section.as_str()).collect();
    assert_eq!(names, vec![".text._Z6squarei", ".text._Z4namev"]);
    assert_eq!(first, second);
    let index: Vec<SectionFingerprint> =
        serde_json::from_slice(&fs::read(store.index_path(&b)).unwrap()).unwrap();
    assert_eq!(index, second);
    assert!(store
        .objects_dir(&b)
        .join("src/math/math.o")
        .is_file());
}
