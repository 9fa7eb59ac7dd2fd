//! Known-symbol interception: rename undefined externs so the linker pulls
//! in the runtime's replacement instead of the libc original.

use fslice_ir::DataFlowGraph;

const KNOWN_SYMBOLS: &[(&str, &str)] = &[
    ("memset", "__fslice_memset"),
    ("memcpy", "__fslice_memcpy"),
    ("memmove", "__fslice_memmove"),
    ("strcpy", "__fslice_strcpy"),
    ("bzero", "__fslice_bzero"),
    ("malloc", "__fslice_malloc"),
    ("calloc", "__fslice_calloc"),
];

/// Rename every extern in `dfg` that names one of the well-known libc
/// symbols. Must run before any function body in the module is rewritten,
/// so that a `Call` to (say) `malloc` already resolves to `__fslice_malloc`
/// by the time instrumentation reads its callee's name.
pub fn intercept_known_symbols(dfg: &mut DataFlowGraph) {
    let renames: Vec<_> = dfg
        .ext_funcs()
        .filter_map(|(r, name)| {
            KNOWN_SYMBOLS.iter().find(|(known, _)| *known == name).map(|(_, replacement)| (r, *replacement))
        })
        .collect();
    for (func, replacement) in renames {
        dfg.rename_ext_func(func, replacement);
    }
}
