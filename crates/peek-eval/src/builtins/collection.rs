use std::cmp::Ordering;
use std::sync::Arc;

use peek_runtime::{IntRange, ObjectId, Value, MAX_VALUE_DEPTH};

use super::{
    arity, case_equals, check_built_len, compare, compare_or_raise, conversion_error, count_arg,
    int_arg, object, ordering_value, range_bounds, slice_bounds, str_arg, MAX_BUILT_LEN,
};
use crate::ast::Block;
use crate::interpreter::{raise, Flow, Interpreter};
use crate::sandbox::{self, ReceiverKind};

pub(super) fn call_array(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    items: &[Value],
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    let value = match name {
        "length" | "size" => Value::Int(items.len() as i64),
        "empty?" => Value::Bool(items.is_empty()),
        "to_a" | "entries" => receiver.clone(),
        "last" => {
            arity(args, 0..=1)?;
            match args.first() {
                None => items.last().cloned().unwrap_or(Value::Nil),
                Some(n) => {
                    let n = count_arg(n)?.min(items.len());
                    Value::array(items[items.len() - n..].to_vec())
                }
            }
        }
        "[]" | "slice" => element_ref(items, args)?,
        "at" => {
            arity(args, 1..=1)?;
            element_ref(items, args)?
        }
        "fetch" => {
            arity(args, 1..=2)?;
            let idx = int_arg(&args[0])?;
            match resolve_index(idx, items.len()) {
                Some(pos) => items[pos].clone(),
                None => match (block, args.get(1)) {
                    (Some(block), _) => interp.yield_block(block, &[args[0].clone()])?,
                    (None, Some(default)) => default.clone(),
                    (None, None) => {
                        return Err(raise(
                            "IndexError",
                            format!(
                                "index {idx} outside of array bounds: {}...{}",
                                -(items.len() as i64),
                                items.len()
                            ),
                        ))
                    }
                },
            }
        }
        "dig" => {
            let Some((first, rest)) = args.split_first() else {
                return arity(args, 1..=usize::MAX).map(|()| Value::Nil);
            };
            let found = element_ref(items, std::slice::from_ref(first))?;
            if rest.is_empty() || found.is_nil() {
                found
            } else {
                interp.dispatch(&found, "dig", rest, None)?
            }
        }
        "index" | "find_index" => {
            arity(args, 0..=1)?;
            let mut found = None;
            for (idx, item) in items.iter().enumerate() {
                let hit = match (args.first(), block) {
                    (Some(needle), _) => item.equals(needle),
                    (None, Some(block)) => interp.yield_block(block, &[item.clone()])?.truthy(),
                    (None, None) => false,
                };
                if hit {
                    found = Some(idx);
                    break;
                }
            }
            found.map_or(Value::Nil, |idx| Value::Int(idx as i64))
        }
        "reverse" => Value::array(items.iter().rev().cloned().collect()),
        "compact" => Value::array(items.iter().filter(|v| !v.is_nil()).cloned().collect()),
        "flatten" => {
            arity(args, 0..=1)?;
            let depth = match args.first() {
                None | Some(Value::Nil) => None,
                Some(depth) => usize::try_from(int_arg(depth)?).ok(),
            };
            let mut out = Vec::new();
            let mut seen = receiver.identity().into_iter().collect();
            flatten_into(items, depth, &mut seen, &mut out)?;
            Value::array(out)
        }
        "join" => {
            arity(args, 0..=1)?;
            let sep = match args.first() {
                None | Some(Value::Nil) => Arc::from(""),
                Some(sep) => str_arg(sep)?,
            };
            let mut out = String::new();
            let mut seen = receiver.identity().into_iter().collect();
            join_into(interp, items, &sep, &mut seen, &mut out)?;
            Value::str(out)
        }
        "+" => {
            arity(args, 1..=1)?;
            let rhs = array_arg(&args[0])?;
            check_built_len(items.len() + rhs.len())?;
            Value::array(items.iter().chain(rhs.iter()).cloned().collect())
        }
        "-" => {
            arity(args, 1..=1)?;
            let rhs = array_arg(&args[0])?;
            let mut out = Vec::new();
            for item in items {
                interp.check()?;
                if !rhs.iter().any(|other| other.equals(item)) {
                    out.push(item.clone());
                }
            }
            Value::array(out)
        }
        "&" => {
            arity(args, 1..=1)?;
            let rhs = array_arg(&args[0])?;
            let mut common = Vec::new();
            for item in items {
                interp.check()?;
                if rhs.iter().any(|other| other.equals(item)) {
                    common.push(item.clone());
                }
            }
            Value::array(unique(interp, common)?)
        }
        "|" => {
            arity(args, 1..=1)?;
            let rhs = array_arg(&args[0])?;
            let all = items.iter().chain(rhs.iter()).cloned().collect();
            Value::array(unique(interp, all)?)
        }
        "*" => {
            arity(args, 1..=1)?;
            if let Value::Str(_) = &args[0] {
                return call_array(interp, receiver, items, "join", args, None);
            }
            let times = count_arg(&args[0])?;
            check_built_len(items.len().saturating_mul(times))?;
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend_from_slice(items);
            }
            Value::array(out)
        }
        "<=>" => {
            arity(args, 1..=1)?;
            ordering_value(compare(receiver, &args[0]))
        }
        _ => return enumerable(interp, receiver, items, name, args, block),
    };
    Ok(value)
}

pub(super) fn call_range(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    range: IntRange,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    let value = match name {
        "begin" => Value::Int(range.start),
        "end" => Value::Int(range.end),
        "exclude_end?" => Value::Bool(range.exclusive),
        "first" => match args.first() {
            None => Value::Int(range.start),
            Some(n) => {
                let n = count_arg(n)?;
                check_built_len(n.min(range.len() as usize))?;
                Value::array(range.iter().take(n).map(Value::Int).collect())
            }
        },
        "last" => match args.first() {
            None => Value::Int(range.end),
            Some(n) => {
                let n = count_arg(n)? as u64;
                let len = range.len();
                check_built_len(n.min(len) as usize)?;
                let skip = len.saturating_sub(n);
                let start = range.start.saturating_add(skip as i64);
                let tail = IntRange::new(start, range.end, range.exclusive);
                Value::array(tail.iter().map(Value::Int).collect())
            }
        },
        "min" if args.is_empty() && block.is_none() => {
            range.last_included().map_or(Value::Nil, |_| Value::Int(range.start))
        }
        "max" if args.is_empty() && block.is_none() => {
            range.last_included().map_or(Value::Nil, Value::Int)
        }
        "size" => Value::Int(i64::try_from(range.len()).unwrap_or(i64::MAX)),
        "count" if args.is_empty() && block.is_none() => {
            Value::Int(i64::try_from(range.len()).unwrap_or(i64::MAX))
        }
        "include?" | "member?" | "cover?" | "===" => {
            arity(args, 1..=1)?;
            Value::Bool(match &args[0] {
                Value::Int(n) => range.contains(*n),
                Value::Float(f) => {
                    let above = *f >= range.start as f64;
                    let below = if range.exclusive {
                        *f < range.end as f64
                    } else {
                        *f <= range.end as f64
                    };
                    above && below
                }
                _ => false,
            })
        }
        "sum" if args.is_empty() && block.is_none() => match range.last_included() {
            None => Value::Int(0),
            Some(last) => {
                let count = i128::from(last) - i128::from(range.start) + 1;
                let total = (i128::from(range.start) + i128::from(last)) * count / 2;
                i64::try_from(total)
                    .map(Value::Int)
                    .map_err(|_| raise("RangeError", "integer overflow"))?
            }
        },
        "each" => {
            let Some(block) = block else {
                return Ok(receiver.clone());
            };
            for n in range.iter() {
                interp.yield_block(block, &[Value::Int(n)])?;
            }
            receiver.clone()
        }
        "step" => {
            arity(args, 1..=1)?;
            let step = int_arg(&args[0])?;
            if step <= 0 {
                return Err(raise("ArgumentError", "step can't be negative or zero"));
            }
            let mut out = Vec::new();
            let mut next = range.last_included().map(|last| (range.start, last));
            while let Some((n, last)) = next {
                if n > last {
                    break;
                }
                interp.check()?;
                match block {
                    Some(block) => {
                        interp.yield_block(block, &[Value::Int(n)])?;
                    }
                    None => {
                        out.push(Value::Int(n));
                        check_built_len(out.len())?;
                    }
                }
                next = n.checked_add(step).map(|n| (n, last));
            }
            match block {
                Some(_) => receiver.clone(),
                None => Value::array(out),
            }
        }
        "to_a" | "entries" => Value::array(materialize(range)?),
        _ if sandbox::is_call_allowed("Enumerable", name, ReceiverKind::Instance) => {
            let items = materialize(range)?;
            return enumerable(interp, receiver, &items, name, args, block);
        }
        _ => return object::call(interp, receiver, name, args, block),
    };
    Ok(value)
}

fn materialize(range: IntRange) -> Flow<Vec<Value>> {
    if range.len() > MAX_BUILT_LEN as u64 {
        return Err(raise("RangeError", "range is too large to enumerate"));
    }
    Ok(range.iter().map(Value::Int).collect())
}

fn array_arg(value: &Value) -> Flow<Vec<Value>> {
    match value {
        Value::Array(heap) => Ok(heap.snapshot()),
        other => Err(conversion_error(other, "Array")),
    }
}

fn resolve_index(idx: i64, len: usize) -> Option<usize> {
    let len_i = i64::try_from(len).ok()?;
    let idx = if idx < 0 { idx + len_i } else { idx };
    (0..len_i).contains(&idx).then_some(idx as usize)
}

/// `ary[idx]`, `ary[start, len]` and `ary[range]`.
fn element_ref(items: &[Value], args: &[Value]) -> Flow<Value> {
    arity(args, 1..=2)?;
    let slice = match args {
        [Value::Int(idx)] => {
            return Ok(resolve_index(*idx, items.len()).map_or(Value::Nil, |pos| items[pos].clone()))
        }
        [Value::Int(start), count] => slice_bounds(*start, int_arg(count)?, items.len()),
        [Value::Range(range)] => range_bounds(*range, items.len()),
        [other, ..] => return Err(conversion_error(other, "Integer")),
        [] => None,
    };
    Ok(match slice {
        Some((start, count)) => Value::array(items[start..start + count].to_vec()),
        None => Value::Nil,
    })
}

fn unique(interp: &Interpreter<'_>, items: Vec<Value>) -> Flow<Vec<Value>> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        interp.check()?;
        if !out.iter().any(|existing| existing.equals(&item)) {
            out.push(item);
        }
    }
    Ok(out)
}

fn flatten_into(
    items: &[Value],
    depth: Option<usize>,
    seen: &mut Vec<ObjectId>,
    out: &mut Vec<Value>,
) -> Flow<()> {
    for item in items {
        match item {
            Value::Array(heap) if depth != Some(0) => {
                if seen.contains(&heap.id()) {
                    return Err(raise("ArgumentError", "tried to flatten recursive array"));
                }
                if seen.len() >= MAX_VALUE_DEPTH {
                    return Err(raise("ArgumentError", "array nested too deeply to flatten"));
                }
                seen.push(heap.id());
                flatten_into(&heap.snapshot(), depth.map(|d| d - 1), seen, out)?;
                seen.pop();
            }
            other => {
                out.push(other.clone());
                check_built_len(out.len())?;
            }
        }
    }
    Ok(())
}

fn join_into(
    interp: &mut Interpreter<'_>,
    items: &[Value],
    sep: &str,
    seen: &mut Vec<ObjectId>,
    out: &mut String,
) -> Flow<()> {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push_str(sep);
        }
        match item {
            Value::Array(heap) => {
                if seen.contains(&heap.id()) {
                    return Err(raise("ArgumentError", "recursive array join"));
                }
                if seen.len() >= MAX_VALUE_DEPTH {
                    return Err(raise("ArgumentError", "array nested too deeply to join"));
                }
                seen.push(heap.id());
                join_into(interp, &heap.snapshot(), sep, seen, out)?;
                seen.pop();
            }
            other => out.push_str(&interp.to_s(other)?),
        }
        check_built_len(out.len())?;
    }
    Ok(())
}

/// Convert a sort block's result into an ordering.
fn block_ordering(value: &Value, lhs: &Value, rhs: &Value) -> Flow<Ordering> {
    match value {
        Value::Int(n) => Ok(n.cmp(&0)),
        Value::Float(f) if !f.is_nan() => Ok(f.partial_cmp(&0.0).unwrap_or(Ordering::Equal)),
        _ => Err(raise(
            "ArgumentError",
            format!("comparison of {} with {} failed", lhs.type_name(), rhs.type_name()),
        )),
    }
}

/// Stable merge sort with a comparator that may raise.
fn try_sort<T, F>(items: Vec<T>, mut cmp: F) -> Flow<Vec<T>>
where
    T: Clone,
    F: FnMut(&T, &T) -> Flow<Ordering>,
{
    merge_sort(items, &mut cmp)
}

fn merge_sort<T, F>(items: Vec<T>, cmp: &mut F) -> Flow<Vec<T>>
where
    T: Clone,
    F: FnMut(&T, &T) -> Flow<Ordering>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, cmp)?;
    let right = merge_sort(right, cmp)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut l, mut r) = (0, 0);
    while l < left.len() && r < right.len() {
        if cmp(&right[r], &left[l])? == Ordering::Less {
            merged.push(right[r].clone());
            r += 1;
        } else {
            merged.push(left[l].clone());
            l += 1;
        }
    }
    merged.extend_from_slice(&left[l..]);
    merged.extend_from_slice(&right[r..]);
    Ok(merged)
}

fn extreme<T, F>(items: &[T], want: Ordering, mut cmp: F) -> Flow<Option<usize>>
where
    F: FnMut(&T, &T) -> Flow<Ordering>,
{
    let mut best: Option<usize> = None;
    for (idx, item) in items.iter().enumerate() {
        match best {
            None => best = Some(idx),
            Some(current) => {
                if cmp(item, &items[current])? == want {
                    best = Some(idx);
                }
            }
        }
    }
    Ok(best)
}

fn yield_one(interp: &mut Interpreter<'_>, block: &Block, item: &Value) -> Flow<Value> {
    interp.yield_block(block, std::slice::from_ref(item))
}

fn keyed(
    interp: &mut Interpreter<'_>,
    block: &Block,
    items: &[Value],
) -> Flow<Vec<(Value, Value)>> {
    items
        .iter()
        .map(|item| Ok((yield_one(interp, block, item)?, item.clone())))
        .collect()
}

enum Reducer<'b> {
    Op(Arc<str>),
    Block(&'b Block),
}

/// Enumerable methods over a materialized element list. Arrays, ranges and
/// hashes (as `[key, value]` pairs) all land here.
pub(super) fn enumerable(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    items: &[Value],
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    let value = match name {
        "each" => {
            if let Some(block) = block {
                for item in items {
                    yield_one(interp, block, item)?;
                }
            }
            receiver.clone()
        }
        "each_with_index" => match block {
            Some(block) => {
                for (idx, item) in items.iter().enumerate() {
                    interp.yield_block(block, &[item.clone(), Value::Int(idx as i64)])?;
                }
                receiver.clone()
            }
            None => Value::array(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| Value::array(vec![item.clone(), Value::Int(idx as i64)]))
                    .collect(),
            ),
        },
        "map" | "collect" => match block {
            Some(block) => Value::array(
                items
                    .iter()
                    .map(|item| yield_one(interp, block, item))
                    .collect::<Flow<_>>()?,
            ),
            None => Value::array(items.to_vec()),
        },
        "flat_map" => {
            let Some(block) = block else {
                return Ok(Value::array(items.to_vec()));
            };
            let mut out = Vec::new();
            for item in items {
                match yield_one(interp, block, item)? {
                    Value::Array(heap) => out.extend(heap.snapshot()),
                    other => out.push(other),
                }
                check_built_len(out.len())?;
            }
            Value::array(out)
        }
        "select" | "filter" | "reject" => {
            let Some(block) = block else {
                return Ok(Value::array(items.to_vec()));
            };
            let keep = name != "reject";
            let mut out = Vec::new();
            for item in items {
                if yield_one(interp, block, item)?.truthy() == keep {
                    out.push(item.clone());
                }
            }
            Value::array(out)
        }
        "filter_map" => {
            let Some(block) = block else {
                return Ok(Value::array(items.to_vec()));
            };
            let mut out = Vec::new();
            for item in items {
                let mapped = yield_one(interp, block, item)?;
                if mapped.truthy() {
                    out.push(mapped);
                }
            }
            Value::array(out)
        }
        "find" | "detect" => {
            let Some(block) = block else {
                return Ok(Value::Nil);
            };
            let mut found = Value::Nil;
            for item in items {
                if yield_one(interp, block, item)?.truthy() {
                    found = item.clone();
                    break;
                }
            }
            found
        }
        "find_index" => {
            let mut found = Value::Nil;
            for (idx, item) in items.iter().enumerate() {
                let hit = match (args.first(), block) {
                    (Some(needle), _) => item.equals(needle),
                    (None, Some(block)) => yield_one(interp, block, item)?.truthy(),
                    (None, None) => false,
                };
                if hit {
                    found = Value::Int(idx as i64);
                    break;
                }
            }
            found
        }
        "count" => {
            arity(args, 0..=1)?;
            let mut count = 0i64;
            for item in items {
                let hit = match (args.first(), block) {
                    (Some(needle), _) => item.equals(needle),
                    (None, Some(block)) => yield_one(interp, block, item)?.truthy(),
                    (None, None) => true,
                };
                count += i64::from(hit);
            }
            Value::Int(count)
        }
        "all?" | "any?" | "none?" => {
            arity(args, 0..=1)?;
            let mut hits = 0usize;
            for item in items {
                let hit = match (args.first(), block) {
                    (Some(pattern), _) => case_equals(interp, pattern, item),
                    (None, Some(block)) => yield_one(interp, block, item)?.truthy(),
                    (None, None) => item.truthy(),
                };
                if hit {
                    hits += 1;
                    if name != "all?" {
                        break;
                    }
                } else if name == "all?" {
                    break;
                }
            }
            Value::Bool(match name {
                "all?" => hits == items.len(),
                "any?" => hits > 0,
                _ => hits == 0,
            })
        }
        "include?" | "member?" => {
            arity(args, 1..=1)?;
            Value::Bool(items.iter().any(|item| item.equals(&args[0])))
        }
        "sum" => {
            arity(args, 0..=1)?;
            let mut total = args.first().cloned().unwrap_or(Value::Int(0));
            for item in items {
                let item = match block {
                    Some(block) => yield_one(interp, block, item)?,
                    None => item.clone(),
                };
                total = interp.dispatch(&total, "+", &[item], None)?;
            }
            total
        }
        "min" | "max" => {
            arity(args, 0..=0)?;
            let want = if name == "min" { Ordering::Less } else { Ordering::Greater };
            let best = match block {
                Some(block) => extreme(items, want, |a, b| {
                    let result = interp.yield_block(block, &[a.clone(), b.clone()])?;
                    block_ordering(&result, a, b)
                })?,
                None => extreme(items, want, |a, b| compare_or_raise(a, b))?,
            };
            best.map_or(Value::Nil, |idx| items[idx].clone())
        }
        "min_by" | "max_by" => {
            let Some(block) = block else {
                return Ok(Value::Nil);
            };
            let want = if name == "min_by" { Ordering::Less } else { Ordering::Greater };
            let pairs = keyed(interp, block, items)?;
            let best = extreme(&pairs, want, |a, b| compare_or_raise(&a.0, &b.0))?;
            best.map_or(Value::Nil, |idx| pairs[idx].1.clone())
        }
        "sort" => {
            let sorted = match block {
                Some(block) => try_sort(items.to_vec(), |a, b| {
                    let result = interp.yield_block(block, &[a.clone(), b.clone()])?;
                    block_ordering(&result, a, b)
                })?,
                None => try_sort(items.to_vec(), |a, b| {
                    interp.check()?;
                    compare_or_raise(a, b)
                })?,
            };
            Value::array(sorted)
        }
        "sort_by" => {
            let Some(block) = block else {
                return Ok(Value::array(items.to_vec()));
            };
            let pairs = keyed(interp, block, items)?;
            let sorted = try_sort(pairs, |a, b| {
                interp.check()?;
                compare_or_raise(&a.0, &b.0)
            })?;
            Value::array(sorted.into_iter().map(|(_, item)| item).collect())
        }
        "group_by" => {
            let Some(block) = block else {
                return Ok(Value::array(items.to_vec()));
            };
            let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
            for (key, item) in keyed(interp, block, items)? {
                interp.check()?;
                match groups.iter_mut().find(|(existing, _)| existing.equals(&key)) {
                    Some((_, members)) => members.push(item),
                    None => groups.push((key, vec![item])),
                }
            }
            Value::hash(
                groups
                    .into_iter()
                    .map(|(key, members)| (key, Value::array(members)))
                    .collect(),
            )
        }
        "partition" => {
            let Some(block) = block else {
                return Ok(Value::array(items.to_vec()));
            };
            let (mut yes, mut no) = (Vec::new(), Vec::new());
            for item in items {
                if yield_one(interp, block, item)?.truthy() {
                    yes.push(item.clone());
                } else {
                    no.push(item.clone());
                }
            }
            Value::array(vec![Value::array(yes), Value::array(no)])
        }
        "reduce" | "inject" => {
            arity(args, 0..=2)?;
            let (init, reducer) = match (args, block) {
                ([init, Value::Symbol(op)], _) => (Some(init.clone()), Reducer::Op(op.clone())),
                ([Value::Symbol(op)], None) => (None, Reducer::Op(op.clone())),
                ([init], Some(block)) => (Some(init.clone()), Reducer::Block(block)),
                ([], Some(block)) => (None, Reducer::Block(block)),
                _ => return Err(raise("ArgumentError", "wrong number of arguments")),
            };
            let mut rest = items.iter().cloned();
            let Some(mut acc) = init.or_else(|| rest.next()) else {
                return Ok(Value::Nil);
            };
            for item in rest {
                acc = match &reducer {
                    Reducer::Op(op) => interp.dispatch(&acc, op, &[item], None)?,
                    Reducer::Block(block) => interp.yield_block(block, &[acc, item])?,
                };
            }
            acc
        }
        "to_a" | "entries" => Value::array(items.to_vec()),
        "first" => {
            arity(args, 0..=1)?;
            match args.first() {
                None => items.first().cloned().unwrap_or(Value::Nil),
                Some(n) => Value::array(items.iter().take(count_arg(n)?).cloned().collect()),
            }
        }
        "take" => {
            arity(args, 1..=1)?;
            Value::array(items.iter().take(count_arg(&args[0])?).cloned().collect())
        }
        "drop" => {
            arity(args, 1..=1)?;
            Value::array(items.iter().skip(count_arg(&args[0])?).cloned().collect())
        }
        "uniq" => match block {
            None => Value::array(unique(interp, items.to_vec())?),
            Some(block) => {
                let mut keys: Vec<Value> = Vec::new();
                let mut out = Vec::new();
                for (key, item) in keyed(interp, block, items)? {
                    interp.check()?;
                    if !keys.iter().any(|existing| existing.equals(&key)) {
                        keys.push(key);
                        out.push(item);
                    }
                }
                Value::array(out)
            }
        },
        "zip" => {
            let others = args
                .iter()
                .map(|other| match other {
                    Value::Array(heap) => Ok(heap.snapshot()),
                    other => Err(raise(
                        "TypeError",
                        format!("wrong argument type {} (must respond to :each)", other.type_name()),
                    )),
                })
                .collect::<Flow<Vec<_>>>()?;
            Value::array(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        let mut row = vec![item.clone()];
                        row.extend(
                            others
                                .iter()
                                .map(|other| other.get(idx).cloned().unwrap_or(Value::Nil)),
                        );
                        Value::array(row)
                    })
                    .collect(),
            )
        }
        "tally" => {
            let mut counts: Vec<(Value, Value)> = Vec::new();
            for item in items {
                interp.check()?;
                match counts.iter_mut().find(|(existing, _)| existing.equals(item)) {
                    Some((_, Value::Int(n))) => *n += 1,
                    _ => counts.push((item.clone(), Value::Int(1))),
                }
            }
            Value::hash(counts)
        }
        _ => return object::call(interp, receiver, name, args, block),
    };
    Ok(value)
}
