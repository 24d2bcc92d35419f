#![expect(clippy::unwrap_used, reason = "test assertions")]
#![expect(missing_docs, reason = "test file")]

//! A trigger's full lifecycle over the binary transport: create it, then
//! query it back by id.

mod common;

use common::{read_opcode, write_reply};
use mcd_client::codec::request::Opcode;
use mcd_client::codec::value::{
    Addr, AddrSpaceType, McdReturn, Trigger, TrigAction, TrigOption, TrigSimpleCore, TrigType,
};
use mcd_client::facade::ServerHandle;
use tokio::net::TcpListener;

fn sample_trigger() -> Trigger {
    Trigger::SimpleCore(TrigSimpleCore {
        trig_type: TrigType::InstructionHit,
        option: TrigOption::DataIsConditional,
        action: TrigAction::Debug,
        action_param: 0,
        modified: false,
        state_mask: 0xFFFF_FFFF,
        addr_start: Addr {
            address: 0x4000,
            mem_space_id: 1,
            addr_space_id: 0,
            addr_space_type: AddrSpaceType::Mem,
        },
        addr_range: 4,
    })
}

#[tokio::test]
async fn create_trig_then_qry_trig_round_trips_over_real_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let trigger = sample_trigger();

    let server = tokio::spawn({
        let trigger = trigger.clone();
        async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            read_opcode(&mut stream, Opcode::OpenServer).await;
            let mut reply = Vec::new();
            reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
            reply.push(1);
            reply.extend_from_slice(&1_u32.to_le_bytes());
            reply.push(0);
            reply.push(0);
            write_reply(&mut stream, &reply).await;

            read_opcode(&mut stream, Opcode::CreateTrig).await;
            let mut reply = Vec::new();
            reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
            reply.push(1);
            reply.extend_from_slice(&99_u32.to_le_bytes());
            reply.push(1);
            trigger.marshal(&mut reply);
            write_reply(&mut stream, &reply).await;

            read_opcode(&mut stream, Opcode::QryTrig).await;
            let mut reply = Vec::new();
            reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
            reply.push(1);
            trigger.marshal(&mut reply);
            write_reply(&mut stream, &reply).await;
        }
    });

    let config = format!("{}:{}", addr.ip(), addr.port());
    let mut handle = ServerHandle::open_server(&config, "").await.unwrap();

    let created = handle.create_trig(1, trigger.clone()).await.unwrap();
    assert_eq!(created.trig_id, Some(99));
    assert_eq!(created.trigger, Some(trigger.clone()));

    let mut scratch = Vec::new();
    trigger.marshal(&mut scratch);
    let fetched = handle.qry_trig(1, 99, scratch.len()).await.unwrap();
    assert_eq!(fetched, Some(trigger));

    server.await.unwrap();
}
