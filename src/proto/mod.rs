//! Generated client types for the subset of the etcd v3 API dynconf uses
//! (`KV.Range` and `Watch.Watch`).

#![allow(clippy::all)]

tonic::include_proto!("etcdserverpb");
