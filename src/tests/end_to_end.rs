use std::collections::BTreeMap;

use crate::dex::code::{ClassDef, CodeItem, MethodDef, ACC_NATIVE};
use crate::dex::pool::ConstantPool;
use crate::regmap::generate::generate_register_map;
use crate::regmap::pool::{expand_register_map, write_map_pool, ClassMaps, MapPool};
use crate::regmap::types::RegType;
use crate::regmap::{MapFormat, RegisterMap, RegisterMapConfig};
use crate::verify::{verify_class, verify_method};

const CHECKED: RegisterMapConfig = RegisterMapConfig { compress: true, verify: true };

/// const/4 v0, #0; if-eqz v0, +3; const/4 v1, #1; return-void
fn branchy_method() -> MethodDef {
    let code = CodeItem::new(3, 1, vec![0x0012, 0x0038, 0x0003, 0x1112, 0x000e]);
    MethodDef::new("branchy", 0, Some(code))
}

#[test]
fn conditional_method_to_register_map() {
    let method = branchy_method();
    let verified = verify_method(&method, &ConstantPool::default()).expect("verify");

    let flags = &verified.flags;
    assert_eq!(flags.instruction_starts().collect::<Vec<_>>(), vec![0, 1, 3, 4]);
    let widths: usize = flags.instruction_starts().map(|a| flags.width(a)).sum();
    assert_eq!(widths, 5);
    assert!(flags.is_branch_target(0));
    assert!(!flags.is_branch_target(3));
    assert!(flags.is_branch_target(4));

    let blocks = &verified.blocks;
    let spans: Vec<(usize, usize)> = blocks.iter().map(|b| (b.first_addr, b.last_addr())).collect();
    assert_eq!(spans, vec![(0, 1), (3, 3), (4, 4)]);
    assert_eq!(blocks.predecessors(3), vec![0]);
    assert_eq!(blocks.predecessors(4), vec![0, 3]);
    assert!(blocks.block_at(1).is_none());

    assert_eq!(flags.gc_points().collect::<Vec<_>>(), vec![1, 4]);

    // v2 holds `this`; v1 is only ever an int
    let mut lines: BTreeMap<usize, Vec<RegType>> = BTreeMap::new();
    lines.insert(1, vec![RegType::Zero, RegType::Unknown, RegType::Reference]);
    lines.insert(4, vec![RegType::Zero, RegType::Conflict, RegType::Reference]);

    let code = method.code.as_ref().expect("code");
    let map = generate_register_map(flags, code.registers_size, &lines, &CHECKED).expect("map");
    assert_eq!(map.format(), MapFormat::Compact8);
    assert_eq!(map.num_entries(), 2);
    assert_eq!(map.line(1), Some(&[0b100][..]));
    assert_eq!(map.line(4), Some(&[0b100][..]));
    assert_eq!(map.line(3), None);
}

fn entries_of(map: &RegisterMap) -> Vec<(usize, Vec<u8>)> {
    map.entries().map(|(addr, bits)| (addr, bits.to_vec())).collect()
}

#[test]
fn class_through_pool_and_back() {
    let mut class = ClassDef::new("Lcom/example/Loop;");
    class.direct_methods.push(branchy_method());
    class.virtual_methods.push(MethodDef::new("nativeTick", ACC_NATIVE, None));

    //   const/16 v0, #40
    //   sget-object v1, field@0        loop head at 2
    //   add-int/lit8 v0, v0, #-1
    //   if-nez v0, -4
    //   return-void
    let insns = vec![0x0013, 0x0028, 0x0162, 0x0000, 0x00d8, 0xff00, 0x0039, 0xfffc, 0x000e];
    class.virtual_methods.push(MethodDef::new("loop", 0, Some(CodeItem::new(2, 0, insns))));

    let verified = verify_class(&class, &ConstantPool::new(0, 1, 0)).expect("class");
    assert_eq!(verified.len(), 3);
    assert!(verified[1].flags.is_empty());
    assert_eq!(verified[2].flags.gc_points().collect::<Vec<_>>(), vec![2, 6, 8]);
    assert_eq!(verified[2].blocks.predecessors(2), vec![0, 2]);

    // the highest register holds a reference at every GC point
    let mut maps = vec![];
    for (method, result) in class.methods().zip(&verified) {
        let Some(code) = method.code.as_ref() else {
            maps.push(None);
            continue;
        };
        let lines: BTreeMap<usize, Vec<RegType>> = result
            .flags
            .gc_points()
            .map(|addr| {
                let mut regs = vec![RegType::Integer; code.registers_size as usize];
                if let Some(last) = regs.last_mut() {
                    *last = RegType::Reference;
                }
                (addr, regs)
            })
            .collect();
        let map = generate_register_map(&result.flags, code.registers_size, &lines, &CHECKED).expect("map");
        maps.push(Some(map));
    }
    assert_eq!(maps[0].as_ref().map(RegisterMap::format), Some(MapFormat::Compact8));
    assert_eq!(maps[2].as_ref().map(RegisterMap::format), Some(MapFormat::Differential));

    let bytes = write_map_pool(&[Some(ClassMaps { class: &class, maps: maps.clone() })]).expect("pool");
    let pool = MapPool::new(&bytes).expect("map pool");
    let read: Vec<Option<RegisterMap>> = pool
        .class_maps(0)
        .expect("class 0")
        .expect("has maps")
        .collect::<Result<_, _>>()
        .expect("read maps");
    assert_eq!(read.len(), 3);
    assert!(read[1].is_none());

    for (mut loaded, mut original) in read.into_iter().zip(maps) {
        let loaded = expand_register_map(&mut loaded).expect("expand").map(entries_of);
        let original = expand_register_map(&mut original).expect("expand original").map(entries_of);
        assert_eq!(loaded, original);
    }
}
